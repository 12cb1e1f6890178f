use std::collections::{BTreeSet, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use stepwise_recorder::sim::{FailingStream, SharedBuffer, SimHost, SimMethod, SimThread};
use stepwise_recorder::{Agent, FlushPolicy, RecordError, RecordStreams, Stream};

struct Run {
    host: Arc<SimHost>,
    agent: Agent<SimHost>,
    trace: SharedBuffer,
    dictionary: SharedBuffer,
}

fn interned_run() -> Run {
    interned_run_with(|trace, dictionary| (Box::new(trace), Box::new(dictionary)))
}

/// Builds an interned run whose streams wrap the returned buffers.
fn interned_run_with(wrap: impl FnOnce(SharedBuffer, SharedBuffer) -> (Stream, Stream)) -> Run {
    let host = Arc::new(SimHost::new());
    let trace = SharedBuffer::new();
    let dictionary = SharedBuffer::new();
    let (trace_stream, dictionary_stream) = wrap(trace.clone(), dictionary.clone());
    let agent = Agent::start_with_streams(
        Arc::clone(&host),
        RecordStreams {
            trace: trace_stream,
            dictionary: Some(dictionary_stream),
        },
        FlushPolicy::Line,
    )
    .expect("sim host accepts handlers");
    Run {
        host,
        agent,
        trace,
        dictionary,
    }
}

fn inline_run() -> (Arc<SimHost>, Agent<SimHost>, SharedBuffer) {
    let host = Arc::new(SimHost::new());
    let trace = SharedBuffer::new();
    let agent = Agent::start_with_streams(
        Arc::clone(&host),
        RecordStreams {
            trace: Box::new(trace.clone()),
            dictionary: None,
        },
        FlushPolicy::Close,
    )
    .expect("sim host accepts handlers");
    (host, agent, trace)
}

#[test]
fn enter_exit_enter_across_two_threads() {
    let run = interned_run();
    let a = SimThread::new(7001);
    let b = SimThread::new(7002);
    let f = SimMethod::new("C", "f", "()V");
    let g = SimMethod::new("C", "g", "(I)V");

    assert!(run.host.enter(&a, &f));
    assert!(run.host.exit(&a, &f, false));
    assert!(run.host.enter(&b, &g));

    let stats = run.agent.stop().expect("clean stop").expect("recording run");
    assert_eq!(run.trace.lines(), ["1 E 0", "1 X 0", "2 E 1", "2"]);
    assert_eq!(run.dictionary.contents(), "Cf()V\nCg(I)V\n");
    assert_eq!(stats.entities, 2);
    assert_eq!(stats.methods, 2);
    assert_eq!(stats.records(), 3);
}

#[test]
fn shared_method_keeps_its_id() {
    let run = interned_run();
    let method = SimMethod::new("LMain;", "run", "()V");
    run.host.enter(&SimThread::new(1), &method);
    run.host.enter(&SimThread::new(2), &method);

    run.agent.stop().expect("clean stop");
    assert_eq!(run.trace.lines(), ["1 E 0", "2 E 0", "2"]);
    assert_eq!(run.dictionary.lines(), ["LMain;run()V"]);
}

#[test]
fn first_event_may_be_a_step() {
    let run = interned_run();
    let method = SimMethod::new("LMain;", "loop", "()V");
    run.host.step(&SimThread::new(99), &method, 42);

    let stats = run.agent.stop().expect("clean stop").expect("recording run");
    assert_eq!(run.trace.lines(), ["1 42", "1"]);
    assert!(run.dictionary.contents().is_empty());
    assert_eq!(stats.steps, 1);
}

#[test]
fn exceptional_exit_is_recorded_like_a_normal_one() {
    let (host, agent, trace) = inline_run();
    let thread = SimThread::new(3);
    let method = SimMethod::new("LParser;", "parse", "(Ljava/lang/String;)I");
    host.enter(&thread, &method);
    host.exit(&thread, &method, true);

    agent.stop().expect("clean stop");
    assert_eq!(
        trace.lines(),
        [
            "1 E LParser;parse(Ljava/lang/String;)I",
            "1 X LParser;parse(Ljava/lang/String;)I",
            "1",
        ]
    );
}

#[test]
fn empty_run_still_gets_a_trailer() {
    let (_host, agent, trace) = inline_run();
    let stats = agent.stop().expect("clean stop").expect("recording run");
    assert_eq!(trace.contents(), "0\n");
    assert_eq!(stats.entities, 0);
}

#[test]
fn concurrent_events_produce_whole_lines() {
    const THREADS: u64 = 16;
    let run = interned_run();
    let method = SimMethod::new("LWorker;", "tick", "()V");

    thread::scope(|scope| {
        for id in 0..THREADS {
            let host = &run.host;
            let method = &method;
            scope.spawn(move || {
                host.enter(&SimThread::new(id), method);
            });
        }
    });

    run.agent.stop().expect("clean stop");
    let lines = run.trace.lines();
    assert_eq!(lines.len() as u64, THREADS + 1);
    assert_eq!(lines.last().map(String::as_str), Some("16"));

    let tags: BTreeSet<u64> = lines[..lines.len() - 1]
        .iter()
        .map(|line| {
            let (tag, rest) = line.split_once(' ').expect("tag then payload");
            assert_eq!(rest, "E 0", "malformed line {line:?}");
            tag.parse().expect("numeric tag")
        })
        .collect();
    assert_eq!(tags, (1..=THREADS).collect::<BTreeSet<u64>>());
    assert_eq!(run.dictionary.lines(), ["LWorker;tick()V"]);
}

#[test]
fn each_thread_keeps_one_tag_under_contention() {
    const THREADS: u64 = 8;
    const CALLS: usize = 200;
    let run = interned_run();
    let methods = [
        SimMethod::new("LA;", "a", "()V"),
        SimMethod::new("LB;", "b", "(J)J"),
        SimMethod::new("LC;", "c", "()Z"),
    ];

    thread::scope(|scope| {
        for id in 0..THREADS {
            let host = &run.host;
            let methods = &methods;
            scope.spawn(move || {
                let thread = SimThread::new(1000 + id);
                for call in 0..CALLS {
                    let method = &methods[call % methods.len()];
                    host.enter(&thread, method);
                    host.step(&thread, method, call as i64);
                    host.exit(&thread, method, false);
                }
            });
        }
    });

    let stats = run.agent.stop().expect("clean stop").expect("recording run");
    assert_eq!(stats.entities, THREADS);
    assert_eq!(stats.methods, 3);
    assert_eq!(stats.records(), THREADS * CALLS as u64 * 3);

    let lines = run.trace.lines();
    let (trailer, records) = lines.split_last().expect("trailer");
    assert_eq!(trailer, "8");

    // Per tag, records must replay the E, step, X pattern in call order.
    let mut per_tag: HashMap<&str, Vec<&str>> = HashMap::new();
    for line in records {
        let (tag, payload) = line.split_once(' ').expect("tag then payload");
        per_tag.entry(tag).or_default().push(payload);
    }
    assert_eq!(per_tag.len() as u64, THREADS);
    for payloads in per_tag.values() {
        assert_eq!(payloads.len(), CALLS * 3);
        for (call, chunk) in payloads.chunks(3).enumerate() {
            let id = call % methods.len();
            assert_eq!(chunk[0], format!("E {id}"));
            assert_eq!(chunk[1], call.to_string());
            assert_eq!(chunk[2], format!("X {id}"));
        }
    }
}

#[test]
fn undescribable_method_fails_the_run() {
    let run = interned_run();
    let thread = SimThread::new(5);
    run.host
        .enter(&thread, &SimMethod::new("LMain;", "main", "([Ljava/lang/String;)V"));

    let orphan = SimMethod::orphaned("lost", "()V");
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| run.host.enter(&thread, &orphan)));
    assert!(outcome.is_err(), "a host contract violation must be fatal");

    // The exclusive region was released, and later events are refused.
    let again = panic::catch_unwind(AssertUnwindSafe(|| {
        run.host
            .step(&thread, &SimMethod::new("LMain;", "main", "()V"), 1)
    }));
    assert!(again.is_err());

    let err = run.agent.stop().expect_err("failed run");
    assert!(matches!(err, RecordError::RunFailed(_)), "got {err}");
    assert_eq!(run.trace.lines(), ["1 E 0"], "no trailer after failure");
}

#[test]
fn stats_are_readable_mid_run() {
    let run = interned_run();
    let recorder = Arc::clone(run.agent.recorder().expect("recording agent"));
    let method = SimMethod::new("LMain;", "main", "()V");
    run.host.enter(&SimThread::new(1), &method);
    run.host.step(&SimThread::new(1), &method, 4);

    let json = facet_json::to_string(&recorder.stats()).expect("stats should serialize");
    insta::assert_snapshot!(json, @r#"{"entities":1,"methods":1,"entries":1,"exits":0,"steps":1}"#);

    run.agent.stop().expect("clean stop");
    let json = facet_json::to_string(&recorder.stats()).expect("stats should serialize");
    insta::assert_snapshot!(json, @r#"{"entities":1,"methods":1,"entries":1,"exits":0,"steps":1}"#);
}

#[test]
fn trace_write_failure_fails_the_run() {
    let run = interned_run_with(|trace, dictionary| {
        (
            Box::new(FailingStream::after_lines(trace, 1)),
            Box::new(dictionary),
        )
    });
    let thread = SimThread::new(1);
    let f = SimMethod::new("C", "f", "()V");
    run.host.enter(&thread, &f);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| run.host.exit(&thread, &f, false)));
    assert!(outcome.is_err(), "a failed trace write must be fatal");

    let again = panic::catch_unwind(AssertUnwindSafe(|| run.host.step(&thread, &f, 0)));
    assert!(again.is_err(), "events after a failure are refused");

    let err = run.agent.stop().expect_err("failed run");
    assert!(matches!(err, RecordError::RunFailed(_)), "got {err}");
    assert_eq!(run.trace.lines(), ["1 E 0"], "no trailer after failure");
}

#[test]
fn dictionary_write_failure_publishes_no_id() {
    let run = interned_run_with(|trace, dictionary| {
        (
            Box::new(trace),
            Box::new(FailingStream::after_lines(dictionary, 1)),
        )
    });
    let recorder = Arc::clone(run.agent.recorder().expect("recording agent"));
    let thread = SimThread::new(1);
    run.host.enter(&thread, &SimMethod::new("C", "f", "()V"));

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        run.host.enter(&thread, &SimMethod::new("C", "g", "(I)V"))
    }));
    assert!(outcome.is_err(), "a failed dictionary write must be fatal");
    assert_eq!(recorder.stats().methods, 1);

    let again = panic::catch_unwind(AssertUnwindSafe(|| {
        run.host.enter(&thread, &SimMethod::new("C", "f", "()V"))
    }));
    assert!(again.is_err(), "events after a failure are refused");

    let err = run.agent.stop().expect_err("failed run");
    assert!(matches!(err, RecordError::RunFailed(_)), "got {err}");
    assert_eq!(run.dictionary.lines(), ["Cf()V"]);
    assert_eq!(run.trace.lines(), ["1 E 0"], "no record for g and no trailer");
}

#[test]
fn unnamed_method_fails_the_run() {
    let run = interned_run();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        run.host.enter(&SimThread::new(1), &SimMethod::unnamed("LMain;"))
    }));
    assert!(outcome.is_err());
    assert!(matches!(
        run.agent.stop().expect_err("failed run"),
        RecordError::RunFailed(_)
    ));
    assert!(run.trace.contents().is_empty());
}
