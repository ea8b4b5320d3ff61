//! Scheduler behaviour across ticks: suspension, messages, agent lifetime,
//! fault isolation and determinism.

use caos_runtime::{Harness, ProcessStatus, Scheduler, SchedulerConfig, SimWorld, TickReport, WorldConfig};
use caos_vm::values::{AgentId, Value};
use caos_vm::world::World;

fn setup(src: &str, config: SchedulerConfig) -> (Scheduler, SimWorld) {
    let parsed = caos_compiler::parse("c3", src).unwrap();
    let mut scheduler = Scheduler::new(config);
    scheduler.install(&parsed);
    (scheduler, SimWorld::default())
}

/// Big enough that every installer here finishes in its first tick.
fn roomy() -> SchedulerConfig {
    SchedulerConfig { timeslice: Some(1000), ..SchedulerConfig::default() }
}

/// Tick a fixed number of times; `run_until_idle` stops as soon as no
/// context is live, which can leave agent messages undelivered.
fn ticks(scheduler: &mut Scheduler, world: &mut SimWorld, n: usize) -> Vec<TickReport> {
    (0..n).map(|_| scheduler.tick(world)).collect()
}

fn output(reports: &[TickReport]) -> Vec<&str> {
    reports.iter().map(|r| r.output.as_str()).collect()
}

#[test]
fn tark_resumes_next_tick_with_locals() {
    let (mut scheduler, mut world) = setup("setv va00 7 dbg: tark addv va00 1 outv va00", SchedulerConfig::default());
    let reports = scheduler.run_until_idle(&mut world, 10);
    assert_eq!(output(&reports), vec!["", "8"]);
    assert_eq!(reports[1].tick, 2);
    assert_eq!(reports[1].finished, 1);
    assert!(scheduler.is_idle());
}

#[test]
fn wait_resumes_after_n_ticks() {
    let (mut scheduler, mut world) = setup("wait 3 outs \"x\"", SchedulerConfig::default());
    let reports = scheduler.run_until_idle(&mut world, 10);
    assert_eq!(reports.len(), 4);
    assert_eq!(reports[3].output, "x");
}

#[test]
fn timeslice_spreads_long_loops_over_ticks() {
    let src = "reps 20 addv va00 1 repe outs \"done\"";
    let (mut sliced, mut world) = setup(src, SchedulerConfig { timeslice: Some(1), ..SchedulerConfig::default() });
    let reports = sliced.run_until_idle(&mut world, 1000);
    assert!(reports.len() > 20);
    assert_eq!(reports.last().unwrap().output, "done");

    let (mut unsliced, mut world) = setup(src, roomy());
    let reports = unsliced.run_until_idle(&mut world, 1000);
    assert_eq!(output(&reports), vec!["done"]);
}

#[test]
fn inst_runs_without_yielding() {
    let src = "inst reps 50 addv va00 1 repe outv va00";
    let (mut scheduler, mut world) = setup(src, SchedulerConfig { timeslice: Some(1), ..SchedulerConfig::default() });
    let reports = scheduler.run_until_idle(&mut world, 1000);
    assert_eq!(output(&reports), vec!["50"]);
}

#[test]
fn messages_start_event_scripts_next_tick() {
    let src = r#"
        scrp 2 1 1 1000
            outv _p1_
            outv _p2_
        endm
        new: simp 2 1 1 "blnk" 1 0 0
        mesg wrt+ targ 1000 5 6 0
    "#;
    let (mut scheduler, mut world) = setup(src, roomy());
    let first = scheduler.tick(&mut world);
    assert_eq!(first.output, "");
    assert_eq!(first.started, 0);

    let second = scheduler.tick(&mut world);
    assert_eq!(second.started, 1);
    assert_eq!(second.finished, 1);
    assert_eq!(second.output, "56");
}

#[test]
fn constructor_and_timer_events() {
    let src = r#"
        scrp 2 1 1 10
            setv ov00 100
            tick 2
        endm
        scrp 2 1 1 9
            addv ov00 1
        endm
        new: simp 2 1 1 "blnk" 1 0 0
    "#;
    let (mut scheduler, mut world) = setup(src, roomy());
    // tick 1 creates the agent, tick 2 runs the constructor
    scheduler.tick(&mut world);
    scheduler.tick(&mut world);
    let agent = AgentId(1);
    assert_eq!(world.variable(agent, 0).unwrap(), Value::Int(100));

    for _ in 0..6 {
        scheduler.tick(&mut world);
    }
    // timer fires at ticks 4, 6 and 8 and is handled the same tick
    assert_eq!(world.variable(agent, 0).unwrap(), Value::Int(103));
}

#[test]
fn busy_agent_keeps_its_messages_queued() {
    let src = r#"
        scrp 2 1 1 1000
            addv ov00 1
            dbg: tark
        endm
        new: simp 2 1 1 "blnk" 1 0 0
        mesg writ targ 1000
        mesg writ targ 1000
    "#;
    let (mut scheduler, mut world) = setup(src, roomy());
    let reports = ticks(&mut scheduler, &mut world, 6);
    let started: usize = reports.iter().map(|r| r.started).sum();
    assert_eq!(started, 2);
    assert_eq!(world.variable(AgentId(1), 0).unwrap(), Value::Int(2));
}

#[test]
fn destroying_an_agent_cancels_its_context() {
    let src = r#"
        scrp 2 1 1 1000
            loop
                addv ov00 1
                dbg: tark
            ever
        endm
        new: simp 2 1 1 "blnk" 1 0 0
        mesg writ targ 1000
    "#;
    let (mut scheduler, mut world) = setup(src, roomy());
    for _ in 0..4 {
        scheduler.tick(&mut world);
    }
    let agent = AgentId(1);
    let slot = scheduler.slot(agent).unwrap();
    assert_eq!(slot.event(), Some(1000));
    assert_eq!(slot.status(), ProcessStatus::Suspended);

    world.destroy_agent(agent).unwrap();
    let report = scheduler.tick(&mut world);
    assert_eq!(report.cancelled, 1);
    assert!(scheduler.slot(agent).is_none());
    assert!(report.is_clean());
}

#[test]
fn killing_the_owner_ends_the_script() {
    let src = r#"
        scrp 2 1 1 1000
            kill ownr
            outs "never"
        endm
        new: simp 2 1 1 "blnk" 1 0 0
        mesg writ targ 1000
    "#;
    let (mut scheduler, mut world) = setup(src, roomy());
    let reports = ticks(&mut scheduler, &mut world, 3);
    assert!(output(&reports).iter().all(|o| o.is_empty()));
    assert!(reports.iter().all(TickReport::is_clean));
    assert_eq!(world.agent_count(), 0);
}

#[test]
fn faults_are_isolated_per_agent() {
    let src = r#"
        scrp 2 1 1 1000
            setv va00 0
            divv va01 va00
            outs "unreachable"
        endm
        scrp 2 1 2 1000
            outs "b ok"
        endm
        new: simp 2 1 1 "blnk" 1 0 0
        mesg writ targ 1000
        new: simp 2 1 2 "blnk" 1 0 0
        mesg writ targ 1000
    "#;
    let (mut scheduler, mut world) = setup(src, roomy());
    scheduler.tick(&mut world);
    let report = scheduler.tick(&mut world);
    assert_eq!(report.output, "b ok");
    assert_eq!(report.faults.len(), 1);
    assert_eq!(report.faults[0].owner, Some(AgentId(1)));
    assert_eq!(world.faults().len(), 1);
    assert!(world.exists(AgentId(1)));
}

#[test]
fn runaway_context_faults() {
    let (mut scheduler, mut world) = setup("inst loop ever", SchedulerConfig::default());
    let report = scheduler.tick(&mut world);
    assert_eq!(report.faults.len(), 1);
    assert_eq!(report.faults[0].owner, None);
    assert_eq!(report.faults[0].fault.kind(), caos_compiler::diagnostics::ErrorKind::Runtime);
    assert!(report.faults[0].fault.to_string().contains("runaway"));
    assert_eq!(world.faults().len(), 1);
    assert!(scheduler.is_idle());
}

#[test]
fn enum_skips_agents_killed_by_another_script_between_ticks() {
    let src = r#"
        scrp 3 1 1 1000
            enum 2 1 3
                kill targ
            next
        endm
        new: simp 2 1 1 "blnk" 1 0 0
        new: simp 2 1 2 "blnk" 1 0 0
        new: simp 2 1 3 "blnk" 1 0 0
        new: simp 3 1 1 "blnk" 1 0 0
        seta va00 targ
        mesg writ targ 1000
        enum 2 1 0
            outv spcs
            dbg: tark
        next
        dbg: asrt targ eq va00
        outs "end"
    "#;
    let (mut scheduler, mut world) = setup(src, roomy());
    let reports = scheduler.run_until_idle(&mut world, 10);
    let all: String = output(&reports).concat();
    assert_eq!(all, "12end");
    assert!(reports.iter().all(TickReport::is_clean));
    assert!(!world.exists(AgentId(3)));
    assert_eq!(world.agent_count(), 3);
}

#[test]
fn agents_run_in_creation_order() {
    let src = r#"
        scrp 2 1 0 1000
            outv spcs
        endm
        new: simp 2 1 3 "blnk" 1 0 0
        new: simp 2 1 1 "blnk" 1 0 0
        new: simp 2 1 2 "blnk" 1 0 0
        enum 2 1 0
            mesg writ targ 1000
        next
    "#;
    let (mut scheduler, mut world) = setup(src, roomy());
    let reports = ticks(&mut scheduler, &mut world, 2);
    assert_eq!(reports[1].output, "312");
}

#[test]
fn same_seed_same_run() {
    let src = r#"
        reps 10
            outv rand 0 1000
            outs " "
        repe
    "#;
    let run = |seed| {
        let mut harness = Harness::new(WorldConfig { seed, ..WorldConfig::default() }, SchedulerConfig::default());
        harness.run(caos_compiler::Dialect::C3, src).unwrap().output
    };
    assert_eq!(run(7), run(7));
    assert_ne!(run(7), run(8));
}

#[test]
fn removal_script_runs_on_uninstall() {
    let parsed = caos_compiler::parse("c3", "scrp 2 1 1 1000 stop endm rscr outs \"bye\"").unwrap();
    let mut scheduler = Scheduler::default();
    let mut world = SimWorld::default();
    scheduler.install(&parsed);
    assert_eq!(scheduler.scriptorium().len(), 1);
    scheduler.run_until_idle(&mut world, 10);

    assert!(scheduler.uninstall(&parsed).is_some());
    assert!(scheduler.scriptorium().is_empty());
    let reports = scheduler.run_until_idle(&mut world, 10);
    assert_eq!(output(&reports), vec!["bye"]);
}

#[test]
fn configs_read_from_toml() {
    let scheduler: SchedulerConfig = toml::from_str("timeslice = 3").unwrap();
    assert_eq!(scheduler.timeslice, Some(3));
    assert_eq!(scheduler.max_call_depth, SchedulerConfig::default().max_call_depth);

    let world: WorldConfig = toml::from_str("seed = 42\nwidth = 640").unwrap();
    assert_eq!(world.seed, 42);
    assert_eq!(world.width, 640.0);
    assert_eq!(world.height, WorldConfig::default().height);
}
