//! Integration tests exercising the public `vcg_join`/`vcg_maille_tuffin`
//! API against the literal scenarios and a randomised welfare-vs-brute-force
//! check.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use vecfunc_vcg::grid::Grid;
use vecfunc_vcg::joint::BuildOptions;
use vecfunc_vcg::vcg::{vcg_join, vcg_maille_tuffin, JoinOptions};
use vecfunc_vcg::Error;

fn s1_valuations() -> Vec<Grid<i64, 1>> {
    vec![
        Grid::from_values([4], vec![0, 3, 5, 6]).unwrap(),
        Grid::from_values([4], vec![0, 2, 3, 3]).unwrap(),
    ]
}

#[test]
fn s1_one_dimensional_two_bidders() {
    let valuations = s1_valuations();
    let out = vcg_join(&valuations, &[3], true, &JoinOptions::default()).unwrap();

    // The distilled scenario's headline number ("sw = 6") is inconsistent
    // with its own worked example ("v_0(2)=5, v_1(1)=2 -> sw=7"); this
    // crate follows the worked-example arithmetic, which a brute-force
    // check below confirms is the true optimum.
    assert_eq!(out.sw, 7);
    assert_eq!(out.used_resources, [3]);

    let total: usize = out.allocations.iter().map(|a| a[0]).sum();
    assert_eq!(total, 3);

    let payments = out.payments.unwrap();
    assert!(payments[0] + payments[1] <= out.sw);
    assert!(payments.iter().all(|&p| p >= 0));
}

#[test]
fn s2_maille_tuffin_matches_join_engine() {
    // v_0 bids [3,2,1] -> values [0,3,5,6]; v_1 bids [2,1,0] -> values [0,2,3,3].
    let v0 = Grid::<i64, 1>::from_values([4], vec![0, 3, 5, 6]).unwrap();
    let v1 = Grid::<i64, 1>::from_values([4], vec![0, 2, 3, 3]).unwrap();

    let out = vcg_maille_tuffin(&[v0.clone(), v1.clone()], &[[v0], [v1]], &[3], true).unwrap();

    assert_eq!(out.sw, 7);
    assert_eq!(out.allocations[0], [2]);
    assert_eq!(out.allocations[1], [1]);

    let payments = out.payments.unwrap();
    assert_eq!(payments[0], 1);
    assert_eq!(payments[1], 1);
}

#[test]
fn s3_two_dimensional_two_bidders() {
    let v0 = Grid::<i64, 2>::from_fn([3, 3], |x| (x[0] as i64) + 2 * (x[1] as i64)).unwrap();
    let v1 = Grid::<i64, 2>::from_fn([3, 3], |x| 2 * (x[0] as i64) + (x[1] as i64)).unwrap();

    let out = vcg_join(&[v0, v1], &[2, 2], false, &JoinOptions::default()).unwrap();
    // The allocation matches the distilled scenario (a_0=(0,2), a_1=(2,0)),
    // but v_0(0,2) + v_1(2,0) = 4 + 4 = 8, not the "sw = 6" the scenario
    // states - another spec arithmetic slip this crate resolves in favor
    // of the actual welfare at the stated allocation.
    assert_eq!(out.sw, 8);
    assert_eq!(out.allocations[0], [0, 2]);
    assert_eq!(out.allocations[1], [2, 0]);
}

#[test]
fn s4_identical_bidders_winner_absorbs_the_full_externality() {
    // Three identical bidders, v = [0, 1, 2], M = (2,): the two non-winners
    // get the zero bundle and pay nothing by the zero-bundle exemption.
    // The winner's externality is *not* zero here: with the winner removed,
    // the other two (still identical) bidders can still reach welfare 2 on
    // their own, while with the winner present they get 0 - so the winner
    // is charged the full externality, which happens to equal their own
    // private value.
    let make = || Grid::<i64, 1>::from_values([3], vec![0, 1, 2]).unwrap();
    let valuations = vec![make(), make(), make()];

    let out = vcg_join(&valuations, &[2], true, &JoinOptions::default()).unwrap();
    assert_eq!(out.sw, 2);

    let payments = out.payments.unwrap();
    for (i, alloc) in out.allocations.iter().enumerate() {
        if alloc[0] == 0 {
            assert_eq!(payments[i], 0);
        } else {
            assert_eq!(payments[i], out.private_values[i]);
        }
    }
}

#[test]
fn s5_flag_combinations_agree_on_sw_allocations_and_payments() {
    let v0 = Grid::<i64, 2>::from_fn([3, 3], |x| (x[0] as i64) + 2 * (x[1] as i64)).unwrap();
    let v1 = Grid::<i64, 2>::from_fn([3, 3], |x| 2 * (x[0] as i64) + (x[1] as i64)).unwrap();

    let mut reference: Option<(i64, Vec<[usize; 2]>, Vec<i64>)> = None;
    for &filter in &[false, true] {
        for &brute_opt in &[false, true] {
            for &method in &[0u32, 1] {
                for &chunk_size in &[1usize, 16] {
                    let opts = JoinOptions {
                        reorder: true,
                        build: BuildOptions {
                            filter,
                            filter_grad: filter,
                            brute_opt,
                            count: true,
                            buildtime: true,
                            querytime: true,
                            chunk_size,
                            method,
                        },
                    };
                    let out =
                        vcg_join(&[v0.clone(), v1.clone()], &[2, 2], true, &opts).unwrap();
                    let got = (out.sw, out.allocations.clone(), out.payments.unwrap());
                    match &reference {
                        None => reference = Some(got),
                        Some(reference) => assert_eq!(&got, reference),
                    }
                }
            }
        }
    }
}

#[test]
fn s6_maille_tuffin_rejects_non_concave_bids() {
    // values [0,1,3,4] -> bids [1,2,1]: 2 > 1, not non-increasing.
    // Expected: fatal misuse error naming player 0, the offending bidder.
    let v0 = Grid::<i64, 1>::from_values([4], vec![0, 1, 3, 4]).unwrap();
    let v1 = Grid::<i64, 1>::from_values([4], vec![0, 1, 2, 3]).unwrap();

    let Error::Misuse(message) =
        vcg_maille_tuffin(&[v0.clone(), v1.clone()], &[[v0], [v1]], &[3], false).unwrap_err()
    else {
        panic!("expected Error::Misuse");
    };
    assert!(message.contains("bidder 0"), "{message}");
}

#[test]
fn welfare_matches_brute_force_on_random_instances() {
    let mut rng = Pcg64Mcg::seed_from_u64(0x1234_5678_9abc_def0);
    for _ in 0..20 {
        let size: usize = rng.gen_range(3..6);
        let v0 = Grid::<i64, 1>::from_values(
            [size],
            (0..size).map(|_| rng.gen_range(0..20)).collect(),
        )
        .unwrap();
        let v1 = Grid::<i64, 1>::from_values(
            [size],
            (0..size).map(|_| rng.gen_range(0..20)).collect(),
        )
        .unwrap();
        let bound = rng.gen_range(1..size);

        let out = vcg_join(&[v0.clone(), v1.clone()], &[bound], false, &JoinOptions::default())
            .unwrap();

        let mut best = i64::MIN;
        for k in 0..=bound {
            best = best.max(v0.at(&[k]) + v1.at(&[bound - k]));
        }
        assert_eq!(out.sw, best);
    }
}
