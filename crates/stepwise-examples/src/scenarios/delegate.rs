use crate::scenarios::Session;
use std::sync::Arc;
use stepwise_recorder::sim::SimHost;
use stepwise_recorder::{
    Agent, AgentConfig, ClassListing, DelegateConfig, HostError, LoadedClass, OpenRequest,
    TraceConsumer,
};
use stepwise_types::RunStats;
use tracing::info;

/// Stands in for the managed-runtime side that owns the trace file.
struct LoggingConsumer;

impl TraceConsumer for LoggingConsumer {
    fn open(&self, request: &OpenRequest) -> Result<(), HostError> {
        let json = facet_json::to_string(request)
            .map_err(|e| HostError::new("open", format!("cannot render request: {e}")))?;
        info!(request = %json, "consumer open");
        Ok(())
    }

    fn close(&self) -> Result<(), HostError> {
        info!("consumer close");
        Ok(())
    }
}

fn loaded_classes() -> Vec<LoadedClass> {
    [
        ("Ljava/lang/Object;", true),
        ("Ljava/lang/String;", true),
        ("[Ljava/lang/String;", true),
        ("LMain;", false),
        ("LMain$Worker;", false),
        ("[LMain$Worker;", false),
    ]
    .into_iter()
    .map(|(signature, boot)| LoadedClass {
        signature: signature.to_owned(),
        boot,
    })
    .collect()
}

/// Hands the run to an embedded consumer and lists loaded classes at exit.
pub fn run(session: &Session) -> Result<Option<RunStats>, String> {
    let host = Arc::new(SimHost::new().with_loaded_classes(loaded_classes()));
    let config = AgentConfig::delegate(DelegateConfig {
        trace: Some(session.out_dir.join("chord.trace")),
        instr_scheme: Some(session.out_dir.join("scheme.txt")),
        num_meths: 2,
        num_loops: 0,
        instr_bound: 5_000,
        class_listing: Some(ClassListing {
            classes: session.out_dir.join("classes.txt"),
            boot_classes: session.out_dir.join("boot_classes.txt"),
        }),
    });

    let agent = Agent::start_with_consumer(host, config, Some(Arc::new(LoggingConsumer)))
        .map_err(|e| e.to_string())?;
    agent.vm_start();
    agent.vm_init().map_err(|e| e.to_string())?;
    agent.vm_death().map_err(|e| e.to_string())?;
    agent.stop().map_err(|e| e.to_string())?;

    println!(
        "delegate: class listing written to {}",
        session.out_dir.display()
    );
    Ok(None)
}
