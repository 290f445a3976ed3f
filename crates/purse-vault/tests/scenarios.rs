// crates/purse-vault/tests/scenarios.rs
//
// End-to-end tests for both ledger tiers.
//
// Covers the reference scenarios (reward on an empty pool, late-depositor
// fairness, withdrawal vesting, vault exit with a withdrawal fee), the
// no-double-payout and vesting properties, and a seeded randomized
// interleaving of every entry point that re-checks the ledger invariants
// after each step.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use purse_core::{Address, Asset, ErrorKind};
use purse_staking::{StakingParams, StakingSystem};
use purse_vault::{VaultParams, VaultSystem};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn owner() -> Address {
    Address::from_label("owner")
}

fn user(name: &str) -> Address {
    Address::from_label(name)
}

fn base_system(rate: u64, lock_period: u64) -> StakingSystem {
    let mut params = StakingParams::labelled("scenario", owner(), owner());
    params.tokens_per_interval = rate;
    params.lock_period = lock_period;
    let mut sys = StakingSystem::new(params);
    for name in ["alice", "bob"] {
        sys.credit(Asset::Purse, user(name), 1_000_000).unwrap();
    }
    let treasury = sys.treasury().address();
    sys.credit(Asset::Purse, treasury, 1_000_000_000).unwrap();
    sys
}

fn vault_system(base_rate: u64, reward_rate: u64, lock_period: u64) -> VaultSystem {
    let mut params = VaultParams::labelled("scenario", owner(), owner());
    params.base.tokens_per_interval = base_rate;
    params.base.lock_period = lock_period;
    params.config.vest_duration = lock_period;
    params.reward_rate = reward_rate;
    let mut sys = VaultSystem::new(params).unwrap();
    let treasury = sys.base().treasury().address();
    sys.credit(Asset::Purse, treasury, 1_000_000_000_000).unwrap();
    sys.credit(Asset::VaultReward, owner(), 1_000_000_000_000).unwrap();
    sys.fund_rewards(owner(), 1_000_000_000_000).unwrap();
    sys
}

// ---------------------------------------------------------------------------
// Reference scenarios
// ---------------------------------------------------------------------------

#[test]
fn test_scenario_a_single_depositor_gets_one_interval() {
    let mut sys = base_system(10, 100);
    sys.deposit(user("alice"), 1_000, 0).unwrap();
    assert_eq!(sys.distribute(owner(), 1).unwrap(), 10);
    assert_eq!(sys.preview_claimable(&user("alice")).unwrap(), 10);
}

#[test]
fn test_scenario_b_late_depositor_fairness() {
    let mut sys = base_system(1, 100);
    let (a, b) = (user("alice"), user("bob"));
    sys.deposit(a, 1_000, 0).unwrap();
    // B's deposit pokes the feed: the first 10 go to A alone.
    sys.deposit(b, 1_000, 10).unwrap();
    assert_eq!(sys.preview_claimable(&a).unwrap(), 10);
    assert_eq!(sys.preview_claimable(&b).unwrap(), 0);

    let pool = sys.pool().address();
    for t in [30, 110, 250] {
        sys.distribute(pool, t).unwrap();
        let ra = sys.preview_claimable(&a).unwrap();
        let rb = sys.preview_claimable(&b).unwrap();
        assert_eq!(ra - rb, 10, "gap must stay at the pre-entry reward");
        assert_eq!(rb, (t - 10) / 2);
    }
}

#[test]
fn test_scenario_c_withdrawal_vests_then_pays_once() {
    let mut sys = base_system(0, 100);
    let a = user("alice");
    sys.deposit(a, 1_000, 0).unwrap();
    let principal = sys.withdraw(a, 500, 5).unwrap();
    assert_eq!(principal, 500);
    assert_eq!(sys.pool().total_locked_amount(), 500);

    let schedule = *sys.vesting().schedule_at(&a, 0).unwrap();
    assert_eq!(schedule.amount, 500);
    assert_eq!(schedule.end_time, 105);

    let err = sys.sweep(a, 104).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NothingToDo);

    let before = sys.bank().balance(Asset::Purse, &a);
    assert_eq!(sys.sweep(a, 105).unwrap(), 500);
    assert_eq!(sys.bank().balance(Asset::Purse, &a), before + 500);
    assert_eq!(sys.vesting().num_schedules(&a), 0);
    assert_eq!(sys.pool().total_locked_amount(), 0);
    assert_eq!(sys.sweep(a, 1_000).unwrap_err().kind(), ErrorKind::NothingToDo);
}

#[test]
fn test_scenario_d_vault_exit_fee_reaches_treasury() {
    let mut sys = vault_system(0, 0, 100);
    let a = user("alice");
    sys.credit(Asset::Purse, a, 10_000).unwrap();
    sys.stake(a, 10_000, 0).unwrap();
    let shares = sys.vault().user_info(&a).shares;
    let out = sys.unstake(a, shares, 0).unwrap();

    let vault = sys.vault().address();
    let base_schedule = *sys.base().vesting().schedule_at(&vault, 0).unwrap();
    let user_schedule = *sys.vesting().schedule_at(&a, 0).unwrap();
    assert_eq!(base_schedule.amount, 10_000);
    assert_eq!(out.withdrawal_fee, 50);
    assert_eq!(user_schedule.amount, base_schedule.amount - out.withdrawal_fee);
    assert_eq!(user_schedule.start_time, base_schedule.start_time);
    assert_eq!(user_schedule.end_time, base_schedule.end_time);

    assert_eq!(sys.sweep(a, 100).unwrap(), 9_950);
    assert_eq!(sys.bank().balance(Asset::Purse, &a), 9_950);
    assert_eq!(sys.base().vesting().num_schedules(&vault), 0);

    // The fee waits in vault custody until collected.
    let treasury = sys.vault().treasury();
    assert_eq!(sys.bank().balance(Asset::Purse, &treasury), 0);
    assert_eq!(sys.collect_withdrawal_fees(owner(), 100).unwrap(), 50);
    assert_eq!(sys.bank().balance(Asset::Purse, &treasury), 50);
    assert_eq!(sys.vault().total_locked(), 0);
    assert!(sys.audit().is_empty());
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[test]
fn test_equal_entries_stay_equal_through_other_activity() {
    let mut sys = base_system(7, 100);
    let (a, b, c) = (user("alice"), user("bob"), user("carol"));
    sys.credit(Asset::Purse, c, 1_000_000).unwrap();
    sys.deposit(a, 2_000, 0).unwrap();
    sys.deposit(b, 2_000, 0).unwrap();

    sys.deposit(c, 5_000, 13).unwrap();
    sys.withdraw(c, 3_000, 29).unwrap();
    sys.claim(c, 41).unwrap();
    sys.deposit(c, 777, 58).unwrap();

    let pool = sys.pool().address();
    sys.distribute(pool, 90).unwrap();
    let ra = sys.preview_claimable(&a).unwrap();
    assert!(ra > 0);
    assert_eq!(ra, sys.preview_claimable(&b).unwrap());
}

#[test]
fn test_claim_never_pays_twice() {
    let mut sys = base_system(10, 100);
    let a = user("alice");
    sys.deposit(a, 1_000, 0).unwrap();
    assert_eq!(sys.claim(a, 10).unwrap(), 100);
    assert_eq!(sys.claim(a, 10).unwrap_err().kind(), ErrorKind::NothingToDo);
    assert_eq!(sys.claim(a, 11).unwrap(), 10);
}

#[test]
fn test_withdrawal_keeps_reward_claimable() {
    let mut sys = base_system(10, 100);
    let a = user("alice");
    sys.deposit(a, 1_000, 0).unwrap();
    sys.withdraw(a, 1_000, 10).unwrap();
    assert_eq!(sys.user_info(&a).receipt_shares, 0);
    assert_eq!(sys.claim(a, 50).unwrap(), 100);
}

#[test]
fn test_empty_pool_reward_is_buffered_not_lost() {
    let mut sys = base_system(10, 100);
    let pool = sys.pool().address();
    sys.distribute(pool, 5).unwrap();
    assert_eq!(sys.pool().accumulator().pending_reward(), 50);
    sys.deposit(user("alice"), 1_000, 5).unwrap();
    sys.distribute(pool, 6).unwrap();
    assert_eq!(sys.preview_claimable(&user("alice")).unwrap(), 60);
}

#[test]
fn test_underfunded_treasury_defers_claim() {
    let mut params = StakingParams::labelled("dry", owner(), owner());
    params.tokens_per_interval = 10;
    let mut sys = StakingSystem::new(params);
    let a = user("alice");
    sys.credit(Asset::Purse, a, 1_000).unwrap();
    sys.deposit(a, 1_000, 0).unwrap();
    let err = sys.claim(a, 10).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
    assert_eq!(sys.preview_claimable_at(&a, 10).unwrap(), 100);

    sys.credit(Asset::Purse, owner(), 100).unwrap();
    sys.fund_treasury(owner(), 100).unwrap();
    assert_eq!(sys.claim(a, 10).unwrap(), 100);
}

#[test]
fn test_vault_rewards_stream_pro_rata_and_auto_pay() {
    let mut sys = vault_system(0, 100, 50);
    let (a, b) = (user("alice"), user("bob"));
    sys.credit(Asset::Purse, a, 3_000).unwrap();
    sys.credit(Asset::Purse, b, 1_000).unwrap();
    sys.stake(a, 3_000, 0).unwrap();
    sys.stake(b, 1_000, 0).unwrap();
    assert_eq!(sys.claimable(&a, 10).unwrap(), 750);
    assert_eq!(sys.claimable(&b, 10).unwrap(), 250);

    assert_eq!(sys.claim_rewards(b, 10).unwrap(), 250);
    assert_eq!(sys.bank().balance(Asset::VaultReward, &b), 250);

    // Unstaking pays what has accrued.
    let shares = sys.vault().user_info(&a).shares;
    sys.unstake(a, shares, 20).unwrap();
    assert_eq!(sys.bank().balance(Asset::VaultReward, &a), 1_500);
    assert_eq!(sys.claimable(&a, 1_000).unwrap(), 0);
}

#[test]
fn test_vault_stake_auto_compounds_above_minimum() {
    let mut sys = vault_system(10, 0, 50);
    let (a, b) = (user("alice"), user("bob"));
    sys.credit(Asset::Purse, a, 1_000).unwrap();
    sys.credit(Asset::Purse, b, 1_000).unwrap();
    sys.stake(a, 1_000, 0).unwrap();
    // 100s at 10/s is 1000 pending, above the 500 minimum.
    sys.stake(b, 1_000, 100).unwrap();
    let info = sys.vault_info();
    // 1000 harvested, 60 skimmed, 940 reinvested before B's deposit.
    assert_eq!(info.total_assets, 2_000 + 940);
    assert_eq!(sys.bank().balance(Asset::Purse, &b), 50);
    assert!(sys.vault().user_info(&b).shares < 1_000);
    assert!(sys.audit().is_empty());
}

#[test]
fn test_vault_cap_rejects_excess() {
    let mut sys = vault_system(0, 0, 50);
    sys.update_vault_configs(owner(), 500, 1_500).unwrap();
    let a = user("alice");
    sys.credit(Asset::Purse, a, 2_000).unwrap();
    sys.stake(a, 1_000, 0).unwrap();
    let err = sys.stake(a, 600, 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(sys.bank().balance(Asset::Purse, &a), 1_000);
}

#[test]
fn test_vault_stake_existing_receipt_shares() {
    let mut sys = vault_system(0, 0, 50);
    let a = user("alice");
    sys.credit(Asset::Purse, a, 1_000).unwrap();
    sys.base_mut().deposit(a, 1_000, 0).unwrap();
    assert_eq!(sys.stake_receipt_shares(a, 400, 1).unwrap(), 400);
    assert_eq!(sys.base().user_info(&a).receipt_shares, 600);
    assert_eq!(sys.vault().total_assets(), 400);
}

// ---------------------------------------------------------------------------
// Randomized interleaving
// ---------------------------------------------------------------------------

const USERS: [&str; 4] = ["u0", "u1", "u2", "u3"];

struct Watermarks {
    base_acc: u128,
    vault_acc: u128,
    vested: Vec<(u64, u64)>,
}

fn tracked_purse(sys: &VaultSystem) -> u128 {
    let bank = sys.bank();
    let mut holders: Vec<Address> = USERS.iter().map(|n| user(n)).collect();
    holders.extend([
        owner(),
        sys.base().pool().address(),
        sys.base().treasury().address(),
        sys.vault().address(),
        sys.vault().treasury(),
    ]);
    holders.iter().map(|a| bank.balance(Asset::Purse, a) as u128).sum()
}

fn check_invariants(sys: &VaultSystem, marks: &mut Watermarks, step: usize) {
    let problems = sys.audit();
    assert!(problems.is_empty(), "step {}: {:?}", step, problems);
    assert_eq!(
        tracked_purse(sys),
        sys.bank().supply(Asset::Purse) as u128,
        "step {}: PURSE leaked",
        step
    );

    let base_acc = sys.base().pool().accumulator().value();
    let vault_acc = sys.vault().accumulator().value();
    assert!(base_acc >= marks.base_acc, "step {}: base accumulator regressed", step);
    assert!(vault_acc >= marks.vault_acc, "step {}: vault accumulator regressed", step);
    marks.base_acc = base_acc;
    marks.vault_acc = vault_acc;

    for (i, name) in USERS.iter().enumerate() {
        let u = user(name);
        let base_vested = sys.base().vesting().vested_balance(&u);
        let vault_vested = sys.vesting().vested_balance(&u);
        assert!(base_vested >= marks.vested[i].0, "step {}: base vested shrank", step);
        assert!(vault_vested >= marks.vested[i].1, "step {}: vault vested shrank", step);
        marks.vested[i] = (base_vested, vault_vested);

        let outstanding: u64 = sys.vesting().schedules(&u).map(|s| s.amount).sum();
        assert_eq!(outstanding, sys.vesting().escrowed_balance(&u), "step {}", step);
    }
}

#[test]
fn test_randomized_interleaving_preserves_invariants() {
    let mut rng = StdRng::seed_from_u64(0x5eed_2026);
    let mut sys = vault_system(1_000, 300, 200);
    for name in USERS {
        sys.credit(Asset::Purse, user(name), 10_000_000).unwrap();
    }
    let mut marks = Watermarks {
        base_acc: 0,
        vault_acc: 0,
        vested: vec![(0, 0); USERS.len()],
    };
    let mut now = 0u64;
    let mut committed = 0usize;

    for step in 0..600 {
        now += rng.gen_range(0..120);
        let u = user(USERS[rng.gen_range(0..USERS.len())]);
        let before = sys.clone();

        let result = match rng.gen_range(0..11) {
            0 => sys.base_mut().deposit(u, rng.gen_range(0..50_000), now).map(|_| ()),
            1 => {
                let held = sys.base().user_info(&u).receipt_shares;
                sys.base_mut().withdraw(u, rng.gen_range(0..=held), now).map(|_| ())
            }
            2 => sys.base_mut().claim(u, now).map(|_| ()),
            3 => sys.base_mut().sweep(u, now).map(|_| ()),
            4 => sys.stake(u, rng.gen_range(0..50_000), now).map(|_| ()),
            5 => {
                let held = sys.vault().user_info(&u).shares;
                sys.unstake(u, rng.gen_range(0..=held), now).map(|_| ())
            }
            6 => sys.compound(u, now).map(|_| ()),
            7 => sys.sweep(u, now).map(|_| ()),
            8 => sys.claim_rewards(u, now).map(|_| ()),
            9 => sys.collect_withdrawal_fees(owner(), now).map(|_| ()),
            _ => {
                let pool = sys.base().pool().address();
                sys.base_mut().distribute(pool, now).map(|_| ())
            }
        };

        match result {
            Ok(()) => committed += 1,
            Err(e) => {
                assert!(
                    e.kind() != ErrorKind::MathOverflow,
                    "step {}: unexpected overflow: {}",
                    step,
                    e
                );
                assert_eq!(sys, before, "step {}: failed call left a trace", step);
            }
        }
        check_invariants(&sys, &mut marks, step);
    }

    assert!(committed > 100, "only {} calls committed", committed);
}
