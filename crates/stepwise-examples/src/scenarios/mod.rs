pub mod call_sequence;
pub mod delegate;
pub mod shared_method;
pub mod single_step;
pub mod thread_storm;

use std::path::PathBuf;
use std::sync::Arc;
use stepwise_recorder::sim::SimHost;
use stepwise_recorder::{Agent, DEFAULT_DICTIONARY_FILE, DEFAULT_TRACE_FILE};
use stepwise_types::RunStats;

pub struct Session {
    pub out_dir: PathBuf,
    pub options: Option<String>,
}

impl Session {
    /// Option string for a recording run: the `--options` override, or an
    /// interned trace/dictionary pair inside the output directory.
    pub fn record_options(&self) -> String {
        self.options.clone().unwrap_or_else(|| {
            format!(
                "t_file_name={},m_file_name={}",
                self.out_dir.join(DEFAULT_TRACE_FILE).display(),
                self.out_dir.join(DEFAULT_DICTIONARY_FILE).display()
            )
        })
    }

    pub fn start(&self, host: &Arc<SimHost>) -> Result<Agent<SimHost>, String> {
        let options = self.record_options();
        let agent = Agent::start_from_options(Arc::clone(host), Some(options.as_str()), None)
            .map_err(|e| e.to_string())?;
        agent.vm_start();
        agent.vm_init().map_err(|e| e.to_string())?;
        Ok(agent)
    }
}

pub fn shutdown(agent: Agent<SimHost>) -> Result<Option<RunStats>, String> {
    agent.vm_death().map_err(|e| e.to_string())?;
    agent.stop().map_err(|e| e.to_string())
}
