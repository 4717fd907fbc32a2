#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use ::farmhand::*;
use ::farmhand::chain::ContractCall;
use ::farmhand::config::ProtocolErrorCodes;
use ::farmhand::farmer::{
    boot_cycle, plant_step, ActionExecutor, BootPlan, BootTools, EventKind, PlantClock, PlantRequest, PlantStep,
    RoundEvent,
};
use ::farmhand::pow::{ProcessSlot, ProofOfWorkRunner};
use ::farmhand::types::{BlockInfo, Millis};
use anyhow::Result;
use kanal::{unbounded_async, AsyncReceiver, AsyncSender};

// ===== Test Helper Functions =====

const FARMER: &str = "GFARMER";

fn test_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("System time before UNIX_EPOCH")
        .as_secs()
}

fn solution_hash() -> String {
    format!("0000000{}", "a".repeat(57))
}

fn pow_script(dir: &Path, body: &str) -> Result<PathBuf> {
    let path = dir.join("pow.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body))?;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
    Ok(path)
}

fn solving_script(dir: &Path) -> Result<PathBuf> {
    pow_script(
        dir,
        &format!("echo 'progress 50%'\necho '[\"31337\", \"{}\"]'", solution_hash()),
    )
}

fn round_data(index: RoundIndex, started_secs: u64, pail: Option<Pail>) -> ContractData {
    ContractData {
        index,
        block: Some(BlockInfo {
            entropy: Some(format!("{:02x}", index).repeat(32)),
            timestamp: Some(started_secs),
        }),
        pail,
    }
}

fn planted_pail() -> Pail {
    Pail {
        sequence: Some(1),
        stake_amount: Some(100),
        ..Default::default()
    }
}

fn fast_config(pow_binary: &Path) -> FarmerConfig {
    let mut config = FarmerConfig::for_farmer(FARMER);
    config.farmer_hex = Some("ab".repeat(32));
    config.pow_binary = pow_binary.to_string_lossy().into_owned();
    config.stake_amount = 100;
    config.nonce_count = 1000;
    config.timings = Timings {
        poll_interval_ms: 20,
        preemptive_plant_after_ms: 300_000,
        harvest_after_ms: 300_000,
        work_delay_ms: 0,
        max_errors: 12,
    };
    config
}

fn mock_farmer(config: FarmerConfig, chain: &MockChain, harvester: &MockHarvester) -> Result<Farmer> {
    Farmer::new(
        config,
        ChainVariant::Mock(chain.clone()),
        HarvestVariant::Mock(harvester.clone()),
    )
}

async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

/// Everything a standalone boot cycle needs, bound to round 5.
struct BootRig {
    _dir: tempfile::TempDir,
    chain: MockChain,
    executor: ActionExecutor,
    runner: ProofOfWorkRunner,
    slot: ProcessSlot,
    clock: PlantClock,
    events_tx: AsyncSender<RoundEvent>,
    events_rx: AsyncReceiver<RoundEvent>,
}

impl BootRig {
    fn new(script_body: Option<&str>) -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let script = match script_body {
            Some(body) => pow_script(dir.path(), body)?,
            None => solving_script(dir.path())?,
        };

        let chain = MockChain::new(ContractData::default());
        let executor = ActionExecutor::new(
            Arc::new(ChainVariant::Mock(chain.clone())),
            FARMER,
            ProtocolErrorCodes::default(),
        );
        let runner = ProofOfWorkRunner::new(script.to_string_lossy(), "ab".repeat(32), 1000);
        let slot = ProcessSlot::new();
        slot.bind(5);
        let (events_tx, events_rx) = unbounded_async::<RoundEvent>();

        Ok(Self {
            _dir: dir,
            chain,
            executor,
            runner,
            slot,
            clock: PlantClock::new(),
            events_tx,
            events_rx,
        })
    }

    async fn boot(&self, plan: BootPlan, work_delay: Duration) -> Result<()> {
        let tools = BootTools {
            executor: &self.executor,
            runner: &self.runner,
            slot: &self.slot,
            clock: &self.clock,
        };
        boot_cycle(tools, plan, work_delay, &self.events_tx).await
    }
}

fn plan(plant: Option<i128>, planted_at: Option<Millis>) -> BootPlan {
    BootPlan {
        index: 5,
        entropy: [5u8; 32],
        plant,
        worked: false,
        planted_at,
    }
}

/// Work must not land before `anchor + delay`. Wall-clock millisecond
/// truncation may shave a little off the wait.
fn assert_work_not_before(at: Instant, anchor: Instant, delay: Duration) {
    assert!(
        at.duration_since(anchor) + Duration::from_millis(5) >= delay,
        "work submitted {:?} after its anchor, delay is {:?}",
        at.duration_since(anchor),
        delay
    );
}

// ===== Boot Cycle Tests =====

#[tokio::test]
async fn test_boot_cycle_holds_work_until_gap() -> Result<()> {
    println!("\n=== E2E Test: work waits for the plant gap ===\n");
    ::farmhand::telemetry::init();

    let rig = BootRig::new(None)?;
    let work_delay = Duration::from_millis(400);

    let started = Instant::now();
    rig.boot(plan(Some(100), None), work_delay).await?;

    assert_eq!(rig.chain.plant_amounts(), vec![100]);
    let work_calls = rig.chain.work_calls();
    assert_eq!(work_calls.len(), 1);
    let (hash, nonce, at) = work_calls[0];
    assert_eq!(nonce, 31337);
    assert_eq!(hex::encode(hash), solution_hash());
    assert_work_not_before(at, started, work_delay);

    match rig.events_rx.recv().await?.kind {
        EventKind::Planted { at } => {
            assert!(at.is_some());
            assert_eq!(rig.clock.latest(5), at);
        }
        other => panic!("expected Planted, got {:?}", other),
    }
    assert_eq!(rig.events_rx.recv().await?.kind, EventKind::PlantSettled);
    assert_eq!(rig.events_rx.recv().await?, RoundEvent::new(5, EventKind::Worked));
    Ok(())
}

#[tokio::test]
async fn test_boot_cycle_without_plant_time_waits_from_boot_start() -> Result<()> {
    let rig = BootRig::new(None)?;
    let work_delay = Duration::from_millis(400);

    let started = Instant::now();
    rig.boot(plan(None, None), work_delay).await?;

    assert!(rig.chain.plant_amounts().is_empty());
    let work_calls = rig.chain.work_calls();
    assert_eq!(work_calls.len(), 1);
    assert_work_not_before(work_calls[0].2, started, work_delay);
    assert_eq!(rig.events_rx.recv().await?, RoundEvent::new(5, EventKind::Worked));
    Ok(())
}

#[tokio::test]
async fn test_boot_cycle_already_planted_waits_from_boot_start() -> Result<()> {
    let rig = BootRig::new(None)?;
    rig.chain
        .push_plant_reply(SimulatedCall::error("AAAA", "HostError: Error(Contract, #8)"));
    let work_delay = Duration::from_millis(400);

    let started = Instant::now();
    rig.boot(plan(Some(100), None), work_delay).await?;

    assert_eq!(rig.chain.plant_amounts(), vec![100]);
    assert!(rig.clock.latest(5).is_none(), "no plant of ours was accepted");
    let work_calls = rig.chain.work_calls();
    assert_eq!(work_calls.len(), 1);
    assert_work_not_before(work_calls[0].2, started, work_delay);

    assert_eq!(
        rig.events_rx.recv().await?.kind,
        EventKind::Planted { at: None }
    );
    assert_eq!(rig.events_rx.recv().await?.kind, EventKind::PlantSettled);
    assert_eq!(rig.events_rx.recv().await?.kind, EventKind::Worked);
    Ok(())
}

#[tokio::test]
async fn test_boot_cycle_waits_for_later_plant() -> Result<()> {
    let rig = BootRig::new(None)?;
    let work_delay = Duration::from_millis(400);

    // another plant lands for the round while the solution is held back
    let clock = rig.clock.clone();
    let replant = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        clock.record(5, ::farmhand::farmer::now_millis());
        Instant::now()
    });

    rig.boot(plan(None, Some(::farmhand::farmer::now_millis())), work_delay)
        .await?;
    let replanted = replant.await?;

    let work_calls = rig.chain.work_calls();
    assert_eq!(work_calls.len(), 1);
    assert_work_not_before(work_calls[0].2, replanted, work_delay);
    Ok(())
}

#[tokio::test]
async fn test_boot_cycle_progress_only_output_submits_nothing() -> Result<()> {
    let rig = BootRig::new(Some("echo 'progress 1'\necho 'progress 2'"))?;

    rig.boot(plan(None, None), Duration::ZERO).await?;

    assert!(rig.chain.calls().is_empty());
    assert!(rig.events_rx.is_empty(), "no Worked and no Failed event expected");
    assert!(!rig.slot.is_running());
    Ok(())
}

#[tokio::test]
async fn test_boot_cycle_drops_solution_for_finished_round() -> Result<()> {
    let rig = BootRig::new(None)?;

    // the round moves on while the solution waits for the gap
    let rebind_slot = rig.slot.clone();
    let rebind = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        rebind_slot.bind(6);
    });
    rig.boot(
        plan(None, Some(::farmhand::farmer::now_millis())),
        Duration::from_millis(500),
    )
    .await?;
    rebind.await?;

    assert!(rig.chain.work_calls().is_empty());
    assert!(rig.events_rx.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_boot_cycle_skips_pow_when_plant_rejected() -> Result<()> {
    let rig = BootRig::new(None)?;
    rig.chain
        .push_plant_reply(SimulatedCall::error("AAAA", "HostError: Error(Contract, #3)"));

    rig.boot(plan(Some(100), None), Duration::ZERO).await?;

    assert_eq!(rig.chain.plant_amounts(), vec![100]);
    assert!(rig.chain.work_calls().is_empty());
    assert!(matches!(rig.events_rx.recv().await?.kind, EventKind::Failed { .. }));
    assert_eq!(rig.events_rx.recv().await?.kind, EventKind::PlantSettled);
    assert!(rig.events_rx.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_plant_step_outlives_closed_loop() -> Result<()> {
    let rig = BootRig::new(None)?;
    let (events_tx, events_rx) = unbounded_async::<RoundEvent>();
    drop(events_rx);

    let step = plant_step(
        &rig.executor,
        &rig.clock,
        PlantRequest { index: 5, amount: 100 },
        &events_tx,
    )
    .await;

    match step {
        PlantStep::Planted { at: Some(at) } => assert_eq!(rig.clock.latest(5), Some(at)),
        other => panic!("expected an accepted plant, got {:?}", other),
    }
    assert_eq!(rig.chain.plant_amounts(), vec![100]);
    Ok(())
}

// ===== Farmer Loop Tests =====

#[tokio::test]
async fn test_farmer_plants_once_and_works_once() -> Result<()> {
    println!("\n=== E2E Test: single plant while in flight ===\n");
    ::farmhand::telemetry::init();

    let dir = tempfile::tempdir()?;
    let script = solving_script(dir.path())?;

    // plant and work simulations take far longer than a poll tick
    let chain = MockChain::new(round_data(5, test_now_secs(), None)).with_call_delay(Duration::from_millis(300));
    let harvester = MockHarvester::new();
    let farmer = mock_farmer(fast_config(&script), &chain, &harvester)?;

    let result = farmer
        .run_until(tokio::time::sleep(Duration::from_millis(1500)))
        .await;
    assert!(result.is_ok(), "{:?}", result);

    assert_eq!(chain.plant_amounts(), vec![100], "exactly one plant expected");
    assert_eq!(chain.work_calls().len(), 1);
    assert_eq!(chain.sent(), vec!["plant:100".to_string(), "work:31337".to_string()]);
    assert!(harvester.get_launched().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_farmer_harvests_once_per_round() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let script = solving_script(dir.path())?;

    let worked = Pail {
        gap: Some(4),
        zero_count: Some(7),
        ..planted_pail()
    };
    let chain = MockChain::new(round_data(5, test_now_secs() - 10, Some(worked)));
    let harvester = MockHarvester::new();
    let mut config = fast_config(&script);
    config.timings.harvest_after_ms = 5_000;
    let farmer = mock_farmer(config, &chain, &harvester)?;

    farmer
        .run_until(tokio::time::sleep(Duration::from_millis(400)))
        .await?;

    assert_eq!(harvester.get_launched(), vec![5]);
    assert!(chain.calls().is_empty(), "worked round needs no contract calls");
    Ok(())
}

#[tokio::test]
async fn test_farmer_aborts_on_repeated_gap_too_low() -> Result<()> {
    println!("\n=== E2E Test: gap too low until the error ceiling ===\n");
    ::farmhand::telemetry::init();

    let dir = tempfile::tempdir()?;
    let script = solving_script(dir.path())?;

    let chain = MockChain::new(round_data(5, test_now_secs(), Some(planted_pail())));
    for _ in 0..50 {
        chain.push_work_reply(SimulatedCall::error("AAAA", "HostError: Error(Contract, #14)"));
    }
    let harvester = MockHarvester::new();
    let mut config = fast_config(&script);
    config.timings.max_errors = 3;
    let farmer = mock_farmer(config, &chain, &harvester)?;

    let result = tokio::time::timeout(
        Duration::from_secs(10),
        farmer.run_until(tokio::time::sleep(Duration::from_secs(30))),
    )
    .await?;

    let err = result.expect_err("farmer should stop on the error ceiling");
    match err.downcast_ref::<FarmError>() {
        Some(FarmError::TooManyErrors { errors, ceiling }) => {
            assert_eq!(*ceiling, 3);
            assert_eq!(*errors, 4);
        }
        other => panic!("expected TooManyErrors, got {:?}", other),
    }
    assert_eq!(chain.work_calls().len(), 4);
    assert!(chain.plant_amounts().is_empty());
    assert!(chain.sent().is_empty(), "rejected simulations are never submitted");
    Ok(())
}

#[tokio::test]
async fn test_farmer_aborts_when_chain_unreachable() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let script = solving_script(dir.path())?;

    let chain = MockChain::new(round_data(5, test_now_secs(), None));
    chain.fail_reads(100);
    let harvester = MockHarvester::new();
    let mut config = fast_config(&script);
    config.timings.max_errors = 2;
    let farmer = mock_farmer(config, &chain, &harvester)?;

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        farmer.run_until(tokio::time::sleep(Duration::from_secs(30))),
    )
    .await?;

    let err = result.expect_err("unreachable chain should be fatal");
    assert!(matches!(
        err.downcast_ref::<FarmError>(),
        Some(FarmError::TooManyErrors { errors: 3, ceiling: 2 })
    ));
    assert!(chain.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_farmer_round_change_restarts_pow() -> Result<()> {
    println!("\n=== E2E Test: new round terminates the pow process ===\n");
    ::farmhand::telemetry::init();

    let dir = tempfile::tempdir()?;
    // $4 is the round index
    let script = pow_script(
        dir.path(),
        &format!("echo started > {}/round-$4\nexec sleep 30", dir.path().display()),
    )?;

    let chain = MockChain::new(round_data(5, test_now_secs(), Some(planted_pail())));
    let harvester = MockHarvester::new();
    let farmer = mock_farmer(fast_config(&script), &chain, &harvester)?;
    let slot = farmer.slot.clone();

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let handle = tokio::spawn(farmer.run_until(async {
        let _ = stop_rx.await;
    }));

    let round5 = dir.path().join("round-5");
    assert!(wait_until(Duration::from_secs(5), || round5.exists() && slot.is_running()).await);
    assert_eq!(slot.bound_index(), Some(5));

    chain.set_data(round_data(6, test_now_secs(), None));

    let round6 = dir.path().join("round-6");
    assert!(
        wait_until(Duration::from_secs(5), || round6.exists() && slot.is_running()).await,
        "pow for round 6 never started"
    );
    assert_eq!(slot.bound_index(), Some(6));
    assert_eq!(chain.plant_amounts(), vec![100], "round 6 is planted before its pow runs");
    assert!(chain.work_calls().is_empty());

    let _ = stop_tx.send(());
    handle.await??;
    assert!(!slot.is_running(), "shutdown terminates the pow process");
    Ok(())
}

#[tokio::test]
async fn test_farmer_already_planted_round_counts_as_planted() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let script = solving_script(dir.path())?;

    let chain = MockChain::new(round_data(5, test_now_secs(), None));
    chain.push_plant_reply(SimulatedCall::error("AAAA", "HostError: Error(Contract, #8)"));
    let harvester = MockHarvester::new();
    let farmer = mock_farmer(fast_config(&script), &chain, &harvester)?;

    farmer
        .run_until(tokio::time::sleep(Duration::from_millis(600)))
        .await?;

    assert_eq!(chain.plant_amounts(), vec![100]);
    assert_eq!(chain.work_calls().len(), 1);
    assert!(chain
        .calls()
        .iter()
        .all(|c| !matches!(c, ContractCall::Send { envelope } if envelope == "AAAA")));
    Ok(())
}
