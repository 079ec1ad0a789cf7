use std::path::{Path, PathBuf};

use chrono::Utc;
use seqrec_common::error::SeqrecError;
use seqrec_model::batch::{BatchItem, BatchPlan, BatchSession, CaptureDefaults, ItemStatus};
use seqrec_model::capture::CaptureKind;
use seqrec_model::factory::create_default;
use seqrec_model::scene::{ObjectCapability, SceneSnapshot};
use seqrec_model::sequence::{ObjectRef, SourceSequence};
use seqrec_orchestrator::testing::{BackendScript, CountingAssets, SimRig};
use seqrec_orchestrator::{
    FileStore, ItemPhase, KeyValueStore, MachineConfig, MachineState, MemoryStore, Orchestrator,
    OrchestratorOptions, ResumeOutcome, SessionMachine, Synthesizer,
};

fn fixture_plan() -> BatchPlan {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("fixtures")
        .join("sample-batch.json");
    BatchPlan::load(&path).expect("fixture batch should load")
}

fn fixture_scene() -> SceneSnapshot {
    SceneSnapshot::default()
        .with(
            ObjectRef::new("Scenes/Lvl1", "Rig/Hero"),
            &[ObjectCapability::Animator],
        )
        .with(
            ObjectRef::new("Scenes/Lvl1", "Rig/Hero/Body"),
            &[ObjectCapability::SkinnedMesh],
        )
}

fn video_item(name: &str, duration: f64) -> BatchItem {
    BatchItem::new(
        SourceSequence::new(format!("Timelines/{name}"), name, "Lvl1", duration, 30.0),
        vec![create_default(CaptureKind::Video, &CaptureDefaults::default())],
    )
}

fn session(items: Vec<BatchItem>) -> BatchSession {
    BatchSession::new(items, CaptureDefaults::default())
}

fn machine(rig: &SimRig, store: Box<dyn KeyValueStore>) -> SessionMachine {
    SessionMachine::new(MachineConfig::new("/proj"), rig.collaborators(store))
}

fn tick_until(m: &mut SessionMachine, mut done: impl FnMut(&SessionMachine) -> bool) {
    for _ in 0..10_000 {
        if done(m) {
            return;
        }
        m.tick().expect("tick should succeed");
    }
    panic!("condition never reached; state = {}", m.state());
}

#[test]
fn invalid_capture_is_excluded_and_item_still_completes() {
    let rig = SimRig::new();
    let mut items = vec![
        video_item("One", 0.5),
        video_item("Two", 0.5),
        video_item("Three", 0.5),
    ];
    items[1].captures[0].settings.set_fps(-24.0);

    let options =
        OrchestratorOptions::new(MachineConfig::new("/proj")).with_auto_repair(false);
    let mut orch = Orchestrator::new(options, rig.collaborators(Box::new(MemoryStore::new())));
    let preflight = orch.start(session(items)).expect("non-strict start");
    assert_eq!(preflight.errors.len(), 1);

    assert_eq!(orch.run(|_| true).unwrap(), MachineState::Completed);

    let session = orch.session().unwrap();
    assert_eq!(
        session.statuses(),
        vec![
            ItemStatus::Completed,
            ItemStatus::Completed,
            ItemStatus::Completed
        ]
    );
    assert!(session.records[0].warnings.is_empty());
    assert_eq!(session.records[1].warnings.len(), 1);
    assert!(session.records[1].warnings[0].contains("Excluded capture 'Movie'"));
    assert!(session.records[1].captures.is_empty());
    assert!(session.records[2].warnings.is_empty());
    assert_eq!(session.records[2].captures.len(), 1);
    assert!(session.records[2].captures[0].succeeded);
}

#[test]
fn cancel_while_playing_second_of_four() {
    let rig = SimRig::new();
    let mut m = machine(&rig, Box::new(MemoryStore::new()));
    m.start(session(vec![
        video_item("A", 0.5),
        video_item("B", 0.5),
        video_item("C", 0.5),
        video_item("D", 0.5),
    ]))
    .unwrap();
    m.resume().unwrap();

    tick_until(&mut m, |m| {
        matches!(
            m.state(),
            MachineState::Executing {
                index: 1,
                phase: ItemPhase::Playing
            }
        ) && m.progress().unwrap().current_item_fraction > 0.2
    });

    m.cancel().unwrap();
    // Resources are released on the next tick, not mid-frame.
    assert!(rig.assets.live_count() > 0);
    assert_eq!(m.tick().unwrap(), MachineState::Cancelled);

    let session = m.session().unwrap();
    assert_eq!(
        session.statuses(),
        vec![
            ItemStatus::Completed,
            ItemStatus::Cancelled,
            ItemStatus::Pending,
            ItemStatus::Pending
        ]
    );
    assert_eq!(rig.assets.live_count(), 0);
    assert!(!rig.player.is_loaded());
    assert_eq!(rig.backends.aborted(), vec!["Movie".to_string()]);
    assert_eq!(
        rig.host.requests().last(),
        Some(&seqrec_orchestrator::RuntimeMode::Edit)
    );
}

#[test]
fn cancel_handle_is_honoured_on_next_tick() {
    let rig = SimRig::new();
    let mut m = machine(&rig, Box::new(MemoryStore::new()));
    m.start(session(vec![video_item("A", 1.0)])).unwrap();
    m.resume().unwrap();
    m.tick().unwrap();

    m.cancel_handle()
        .store(true, std::sync::atomic::Ordering::SeqCst);
    assert_eq!(m.tick().unwrap(), MachineState::Cancelled);
    assert_eq!(m.session().unwrap().statuses(), vec![ItemStatus::Cancelled]);
}

fn mixed_items() -> Vec<BatchItem> {
    let mut disabled = video_item("Disabled", 0.3);
    disabled.enabled = false;
    let mut failing = video_item("Failing", 0.3);
    failing.captures[0].name = "Broken".into();
    vec![
        video_item("First", 0.3),
        disabled,
        failing,
        video_item("Fourth", 0.3),
        video_item("Fifth", 0.3),
    ]
}

fn assert_round_trip_at(k: usize) {
    let tmp = tempfile::tempdir().unwrap();
    let state_dir = tmp.path().join("state");
    let rig = SimRig::new();
    rig.backends.script(
        "Broken",
        BackendScript {
            fail_on_finish: true,
            ..Default::default()
        },
    );

    let mut before = machine(&rig, Box::new(FileStore::open(&state_dir).unwrap()));
    before.start(session(mixed_items())).unwrap();
    before.resume().unwrap();
    tick_until(&mut before, |m| {
        m.session().map(|s| s.current_index) == Some(k)
            && matches!(m.state(), MachineState::Executing { .. })
    });
    let expected: Vec<ItemStatus> = before.session().unwrap().statuses()[..k].to_vec();
    let session_id = before.session().unwrap().id.clone();
    drop(before);

    let mut after = machine(&rig, Box::new(FileStore::open(&state_dir).unwrap()));
    assert_eq!(
        after.resume().unwrap(),
        ResumeOutcome::Resumed {
            session_id,
            index: k
        }
    );
    let rehydrated = after.session().unwrap();
    assert_eq!(rehydrated.current_index, k);
    assert_eq!(&rehydrated.statuses()[..k], expected.as_slice());

    tick_until(&mut after, |m| !m.state().is_active());
    assert_eq!(after.state(), MachineState::Completed);
    assert_eq!(
        after.session().unwrap().statuses(),
        vec![
            ItemStatus::Completed,
            ItemStatus::Skipped,
            ItemStatus::Failed,
            ItemStatus::Completed,
            ItemStatus::Completed
        ]
    );
}

#[test]
fn persisted_index_survives_restart() {
    for k in [0, 2, 3, 4] {
        assert_round_trip_at(k);
    }
}

#[test]
fn restart_mid_item_reruns_it_with_a_warning() {
    let rig = SimRig::new();
    let store = MemoryStore::new();
    let mut before = machine(&rig, Box::new(store.clone()));
    before.start(session(vec![video_item("A", 0.5)])).unwrap();
    before.resume().unwrap();
    for _ in 0..5 {
        before.tick().unwrap();
    }
    drop(before);

    let mut after = machine(&rig, Box::new(store));
    after.resume().unwrap();
    tick_until(&mut after, |m| !m.state().is_active());

    let record = &after.session().unwrap().records[0];
    assert_eq!(record.status, ItemStatus::Completed);
    assert_eq!(record.attempts, 2);
    assert_eq!(record.warnings.len(), 1);
    assert_eq!(record.captures[0].frames_captured, 15);
}

#[test]
fn lost_session_record_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let rig = SimRig::new();
    let mut before = machine(&rig, Box::new(FileStore::open(tmp.path()).unwrap()));
    before.start(session(vec![video_item("A", 0.5)])).unwrap();
    drop(before);

    std::fs::remove_file(tmp.path().join("session.active.json")).unwrap();

    let mut after = machine(&rig, Box::new(FileStore::open(tmp.path()).unwrap()));
    let err = after.resume().unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, SeqrecError::SessionIntegrity { .. }));
    assert_eq!(after.state(), MachineState::FailedFatal);
    assert_eq!(
        rig.host.requests().last(),
        Some(&seqrec_orchestrator::RuntimeMode::Edit)
    );
}

#[test]
fn corrupt_session_record_is_fatal() {
    let rig = SimRig::new();
    let mut store = MemoryStore::new();
    let mut before = machine(&rig, Box::new(store.clone()));
    before.start(session(vec![video_item("A", 0.5)])).unwrap();
    drop(before);

    store.set("session.active", "{\"version\": \"1.0\", \"id\":").unwrap();

    let mut after = machine(&rig, Box::new(store));
    assert!(after.resume().unwrap_err().is_fatal());
    assert_eq!(after.state(), MachineState::FailedFatal);
}

#[test]
fn second_session_is_rejected_while_one_is_active() {
    let rig = SimRig::new();
    let store = MemoryStore::new();
    let mut orch = Orchestrator::new(
        OrchestratorOptions::new(MachineConfig::new("/proj")),
        rig.collaborators(Box::new(store)),
    );
    orch.start(session(vec![video_item("A", 0.5)])).unwrap();
    orch.resume().unwrap();
    let err = orch.start(session(vec![video_item("B", 0.5)])).unwrap_err();
    assert!(matches!(err, SeqrecError::SessionAlreadyRunning { .. }));
}

#[test]
fn synthesized_clips_share_the_control_span() {
    let plan = fixture_plan();
    let defaults = plan.defaults.clone().unwrap_or_default();
    let synth = Synthesizer::new("/proj");
    let scene = fixture_scene();
    let mut assets = CountingAssets::new();

    for item in &plan.items {
        let synthesis = synth
            .synthesize(item, &defaults, Utc::now(), Some(&scene), &mut assets)
            .expect("fixture items synthesize");
        let graph = synthesis.graph;
        assert!(!graph.captures.is_empty());
        for clip in &graph.captures {
            assert_eq!(clip.span.start_secs, graph.control.span.start_secs);
            assert_eq!(clip.span.duration_secs, graph.control.span.duration_secs);
            assert_eq!(clip.job.frame_count, graph.frame_count);
        }
        graph.verify_alignment().unwrap();
        graph.teardown(&mut assets);
    }
    assert_eq!(assets.live_count(), 0);
}

#[test]
fn fixture_batch_runs_end_to_end() {
    let plan = fixture_plan();
    let rig = SimRig::new();
    let mut collaborators = rig.collaborators(Box::new(MemoryStore::new()));
    collaborators.scene = Some(Box::new(fixture_scene()));
    let mut orch = Orchestrator::new(
        OrchestratorOptions::new(MachineConfig::new("/proj")).with_strict(true),
        collaborators,
    );

    let report = orch
        .start(plan.into_session(&CaptureDefaults::default()))
        .expect("fixture passes strict preflight");
    assert!(report.repairs.is_empty());
    assert_eq!(orch.run(|_| true).unwrap(), MachineState::Completed);

    let session = orch.session().unwrap();
    assert_eq!(
        session.statuses(),
        vec![
            ItemStatus::Completed,
            ItemStatus::Completed,
            ItemStatus::Completed
        ]
    );

    let jobs = rig.backends.log().jobs;
    let names: Vec<&str> = jobs.iter().map(|j| j.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["Movie", "Frames", "Hero Motion", "Hero Cache", "Passes"]
    );
    assert_eq!(
        jobs[1].output_path,
        Path::new("/proj/Recordings/Lvl1_2/Lvl1_2_<Frame>.png")
    );
    assert_eq!(jobs[2].frame_count, 45);
    assert_eq!(jobs[4].channel_outputs.len(), 3);
    assert_eq!(jobs[4].fps, 24.0);
    assert!(jobs.iter().all(|j| j.origin.session_id == session.id));
    assert_eq!((jobs[3].origin.item_index, jobs[3].origin.capture_index), (1, 1));
    assert_eq!((jobs[4].origin.item_index, jobs[4].origin.capture_index), (2, 0));

    // Chase is played from its time-range start.
    let evaluations = rig.player.evaluations();
    assert!(evaluations.iter().any(|t| (t - 1.0).abs() < 1e-9));
    assert_eq!(rig.assets.live_count(), 0);
}
