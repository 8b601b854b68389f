//! End-to-end scheduling scenarios on the simulated platform

use std::sync::Arc;

use rt_nucleus::hal::sim::SimPlatform;
use rt_nucleus::scheduler::queue::{MultiLevelQueue, PList, PrioQueue, QueuePolicy};
use rt_nucleus::{
    ClockSource, Completion, Nucleus, NucleusConfig, NucleusError, Platform, RelaxReason, SynchFlags,
    ThreadAttr, ThreadId, ThreadState, Timeout,
};

fn boot(nr_cpus: usize) -> (Arc<SimPlatform>, Nucleus) {
    let sim = Arc::new(SimPlatform::new());
    let nucleus = Nucleus::new(NucleusConfig::smp(nr_cpus), Platform::from_shared(sim.clone()))
        .expect("valid configuration");
    (sim, nucleus)
}

fn spawn(nucleus: &Nucleus, attr: ThreadAttr) -> ThreadId {
    let tid = nucleus.create(attr).unwrap();
    nucleus.start(tid).unwrap();
    tid
}

fn run(nucleus: &Nucleus, name: &str, prio: i32) -> ThreadId {
    spawn(nucleus, ThreadAttr::new(name, prio))
}

/// Deliver one clock tick per date up to `date`
fn tick_to(sim: &SimPlatform, nucleus: &Nucleus, date: u64) {
    while sim.read_ticks() < date {
        sim.advance(1);
        nucleus.tick_handler();
    }
}

fn cprio(nucleus: &Nucleus, tid: ThreadId) -> i32 {
    nucleus.info(tid).unwrap().current_priority
}

#[test]
fn scenario_highest_priority_picked() {
    let mut mlq: MultiLevelQueue<u32> = MultiLevelQueue::new(0, 257);
    let mut plist: PList<u32> = PList::new(0, 257);
    let queues: [&mut dyn PrioQueue<u32>; 2] = [&mut mlq, &mut plist];
    for q in queues {
        q.insert(1, 10, QueuePolicy::Enqueue).unwrap();
        q.insert(2, 20, QueuePolicy::Enqueue).unwrap();
        assert_eq!(q.pick_highest(), Some(2));
    }

    let (_sim, nucleus) = boot(1);
    let a = nucleus.create(ThreadAttr::new("A", 10)).unwrap();
    let b = nucleus.create(ThreadAttr::new("B", 20)).unwrap();
    nucleus.start(a).unwrap();
    nucleus.start(b).unwrap();
    assert_eq!(nucleus.current(0).unwrap(), b);
    assert!(nucleus.info(a).unwrap().state.contains(ThreadState::READY));
}

#[test]
fn fifo_among_equal_priorities() {
    let (_sim, nucleus) = boot(1);
    let high = run(&nucleus, "high", 50);
    let first = run(&nucleus, "first", 10);
    let second = run(&nucleus, "second", 10);
    assert_eq!(nucleus.current(0).unwrap(), high);

    nucleus.suspend(high).unwrap();
    assert_eq!(nucleus.current(0).unwrap(), first);
    nucleus.yield_now().unwrap();
    assert_eq!(nucleus.current(0).unwrap(), second);
}

#[test]
fn scenario_mutex_inheritance_and_handoff() {
    let (_sim, nucleus) = boot(1);
    let m = nucleus.mutex_create(false, true);
    let a = run(&nucleus, "A", 10);
    nucleus.acquire(m, Timeout::Infinite).unwrap();

    let b = run(&nucleus, "B", 90);
    assert_eq!(
        nucleus.acquire(m, Timeout::Infinite),
        Err(NucleusError::Suspended { thread: b })
    );
    assert_eq!(cprio(&nucleus, a), 90);
    assert_eq!(nucleus.current(0).unwrap(), a);

    nucleus.release(m).unwrap();
    assert_eq!(nucleus.mutex_owner(m).unwrap(), Some(b));
    assert_eq!(nucleus.mutex_lock_count(m).unwrap(), 1);
    assert_eq!(cprio(&nucleus, a), 10);
    assert_eq!(nucleus.current(0).unwrap(), b);
    assert_eq!(nucleus.wait_result(b), Ok(Completion::Done));
}

#[test]
fn transitive_inheritance_settles_and_unwinds() {
    let (_sim, nucleus) = boot(1);
    let m1 = nucleus.mutex_create(false, true);
    let m2 = nucleus.mutex_create(false, true);

    let t1 = run(&nucleus, "T1", 10);
    nucleus.acquire(m1, Timeout::Infinite).unwrap();
    let t2 = run(&nucleus, "T2", 20);
    nucleus.acquire(m2, Timeout::Infinite).unwrap();
    assert!(nucleus.acquire(m1, Timeout::Infinite).is_err());
    let t3 = run(&nucleus, "T3", 30);
    assert!(nucleus.acquire(m2, Timeout::Infinite).is_err());

    assert!(cprio(&nucleus, t1) >= 30);
    assert_eq!(cprio(&nucleus, t2), 30);
    assert_eq!(nucleus.current(0).unwrap(), t1);

    nucleus.release(m1).unwrap();
    assert_eq!(nucleus.current(0).unwrap(), t2);
    assert_eq!(cprio(&nucleus, t1), 10);
    nucleus.release(m1).unwrap();
    nucleus.release(m2).unwrap();
    assert_eq!(nucleus.current(0).unwrap(), t3);
    nucleus.release(m2).unwrap();

    for (tid, base) in [(t1, 10), (t2, 20), (t3, 30)] {
        let info = nucleus.info(tid).unwrap();
        assert_eq!(info.current_priority, base);
        assert!(!info.state.contains(ThreadState::BOOST));
        assert!(info.owned.is_empty());
    }
}

#[test]
fn timed_out_waiter_drops_the_boost() {
    let (sim, nucleus) = boot(1);
    let m = nucleus.mutex_create(false, true);
    let a = run(&nucleus, "A", 10);
    nucleus.acquire(m, Timeout::Infinite).unwrap();
    let b = run(&nucleus, "B", 90);
    assert_eq!(
        nucleus.acquire(m, Timeout::Relative(5)),
        Err(NucleusError::Suspended { thread: b })
    );
    assert_eq!(cprio(&nucleus, a), 90);

    tick_to(&sim, &nucleus, 5);
    assert_eq!(nucleus.wait_result(b), Err(NucleusError::TimedOut));
    assert_eq!(cprio(&nucleus, a), 10);
    assert!(!nucleus.info(a).unwrap().state.contains(ThreadState::BOOST));
    assert!(nucleus.synch_waiters(m).unwrap().is_empty());
    assert_eq!(nucleus.mutex_owner(m).unwrap(), Some(a));
    assert_eq!(nucleus.current(0).unwrap(), b);
}

#[test]
fn unblocked_waiter_drops_the_boost() {
    let (_sim, nucleus) = boot(1);
    let m = nucleus.mutex_create(false, true);
    let a = run(&nucleus, "A", 10);
    nucleus.acquire(m, Timeout::Infinite).unwrap();
    let c = run(&nucleus, "C", 90);
    assert!(nucleus.acquire(m, Timeout::Infinite).is_err());
    assert_eq!(cprio(&nucleus, a), 90);

    assert_eq!(nucleus.unblock(c), Ok(true));
    assert_eq!(nucleus.wait_result(c), Err(NucleusError::Interrupted));
    assert_eq!(cprio(&nucleus, a), 10);
    assert!(nucleus.synch_waiters(m).unwrap().is_empty());
    assert_eq!(nucleus.mutex_owner(m).unwrap(), Some(a));
}

#[test]
fn mutual_exclusion() {
    let (_sim, nucleus) = boot(1);
    let m = nucleus.mutex_create(false, false);
    assert_eq!(nucleus.mutex_owner(m).unwrap(), None);
    let a = run(&nucleus, "A", 10);
    nucleus.acquire(m, Timeout::Infinite).unwrap();
    let _b = run(&nucleus, "B", 20);
    assert_eq!(nucleus.try_acquire(m), Err(NucleusError::WouldBlock));
    assert_eq!(nucleus.release(m), Err(NucleusError::NotOwner));
    assert_eq!(nucleus.mutex_owner(m).unwrap(), Some(a));
}

#[test]
fn scenario_round_robin_quantum() {
    let (sim, nucleus) = boot(1);
    let a = spawn(&nucleus, ThreadAttr::new("A", 50).with_quantum(3));
    assert!(nucleus.info(a).unwrap().state.contains(ThreadState::RRB));

    tick_to(&sim, &nucleus, 2);
    assert_eq!(nucleus.info(a).unwrap().rr_credit, Some(1));
    tick_to(&sim, &nucleus, 3);
    let info = nucleus.info(a).unwrap();
    assert_eq!(info.rr_credit, Some(3));
    assert!(info.running);
    assert_eq!(nucleus.current(0).unwrap(), a);
}

#[test]
fn round_robin_rotates_equal_priorities() {
    let (sim, nucleus) = boot(1);
    let a = spawn(&nucleus, ThreadAttr::new("A", 50).with_quantum(3));
    let b = spawn(&nucleus, ThreadAttr::new("B", 50).with_quantum(3));
    assert_eq!(nucleus.current(0).unwrap(), a);
    tick_to(&sim, &nucleus, 3);
    assert_eq!(nucleus.current(0).unwrap(), b);
    tick_to(&sim, &nucleus, 6);
    assert_eq!(nucleus.current(0).unwrap(), a);
}

#[test]
fn scenario_pend_times_out() {
    let (sim, nucleus) = boot(1);
    let obj = nucleus.synch_create(SynchFlags::PRIO);
    let a = run(&nucleus, "A", 10);
    assert_eq!(
        nucleus.pend(obj, Timeout::Relative(100)),
        Err(NucleusError::Suspended { thread: a })
    );
    assert_eq!(nucleus.synch_waiters(obj).unwrap(), vec![a]);

    tick_to(&sim, &nucleus, 99);
    assert_eq!(nucleus.wait_result(a), Err(NucleusError::Suspended { thread: a }));
    tick_to(&sim, &nucleus, 100);
    assert_eq!(nucleus.wait_result(a), Err(NucleusError::TimedOut));
    assert!(nucleus.synch_waiters(obj).unwrap().is_empty());
    assert_eq!(nucleus.current(0).unwrap(), a);
    assert!(nucleus.latency().max_latency() <= 1);

    // a late signal finds nobody
    assert_eq!(nucleus.signal(obj).unwrap(), None);
}

#[test]
fn scenario_relax_and_harden() {
    let (_sim, nucleus) = boot(1);
    let low = run(&nucleus, "low", 5);
    let a = nucleus.map_shadow(ThreadAttr::new("A", 40), 1234).unwrap();
    nucleus.harden(a).unwrap();
    assert_eq!(nucleus.current(0).unwrap(), a);

    nucleus.relax(RelaxReason::Explicit).unwrap();
    assert!(nucleus.info(a).unwrap().state.contains(ThreadState::RELAX));
    assert_eq!(nucleus.current(0).unwrap(), low);
    nucleus.yield_now().unwrap();
    assert_eq!(nucleus.current(0).unwrap(), low);

    nucleus.harden(a).unwrap();
    let info = nucleus.info(a).unwrap();
    assert!(!info.state.contains(ThreadState::RELAX));
    assert_eq!(info.current_priority, 40);
    assert_eq!(nucleus.current(0).unwrap(), a);
}

#[test]
fn remote_wakeup_sends_ipi() {
    let (sim, nucleus) = boot(2);
    let sem = nucleus.sem_create(0, true);
    sim.set_cpu(1);
    let t = run(&nucleus, "remote", 30);
    assert_eq!(nucleus.info(t).unwrap().cpu, 1);
    assert!(nucleus.sem_pend(sem, Timeout::Infinite).is_err());

    sim.set_cpu(0);
    sim.take_events();
    nucleus.sem_post(sem).unwrap();
    assert_eq!(sim.ipis(), vec![1]);

    sim.set_cpu(1);
    nucleus.handle_ipi();
    assert_eq!(nucleus.current(1).unwrap(), t);
}
