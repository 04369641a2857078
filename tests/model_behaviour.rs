use contagion_paths::pathways::PathState;
use contagion_paths::utilities::approx_eq;
use contagion_paths::{
    CareCapacity, CohortIncidence, CohortSpec, EpiModel, InitialValues, ModelError, PathTimings,
    R0Schedule, Scenario,
};

fn incidence(hosp_rate: f64) -> CohortIncidence {
    CohortIncidence {
        hosp_rate,
        urgent_icu_rate: 0.1,
        crit_rate: 0.3,
        vent_rate: 0.4,
        fatality: hosp_rate * 0.3 * 0.5,
    }
}

fn cohort(label: &str, share: f64, incidence: CohortIncidence) -> CohortSpec {
    CohortSpec {
        label: String::from(label),
        population_share: share,
        incidence,
        capacity: CareCapacity::default(),
    }
}

fn scenario(population: u64, r0: f64, days: usize, cohorts: Vec<CohortSpec>) -> Scenario {
    Scenario {
        model_name: String::from("behaviour"),
        population,
        initial: InitialValues::single_case(population),
        incubation_period: 4.0,
        prediagnosis_period: 3.6,
        schedule: R0Schedule::constant(r0, days),
        timings: PathTimings::default(),
        cohorts,
    }
}

#[test]
fn smoke_run_without_hospitalization() {
    let s = scenario(1000, 2.65, 30, vec![cohort("all", 1.0, incidence(0.0))]);
    let mut m = EpiModel::new(&s).unwrap();
    m.set_conservation_check(true);
    m.run().unwrap();
    let sums = m.gather_sums().unwrap();

    assert_eq!(sums.days(), 31);
    assert!(sums.deceased.iter().all(|d| *d == 0.0));
    assert!(sums.hospitalized.iter().all(|h| *h == 0.0));
    for day in 0..sums.days() {
        let total = sums.susceptible[day]
            + sums.incubating[day]
            + sums.infectious[day]
            + sums.isolated[day]
            + sums.recovered[day];
        assert!(approx_eq(total, 1000.0, 1e-9), "day {} total {}", day, total);
    }
    for pair in sums.recovered.windows(2) {
        assert!(pair[1] >= pair[0]);
    }
    assert!(sums.recovered[30] > 0.0);
}

#[test]
fn dropping_r0_bends_the_infectious_curve() {
    let s = scenario(1000, 3.0, 40, vec![cohort("all", 1.0, incidence(0.1))]);
    let mut m = EpiModel::new(&s).unwrap();
    m.run_r0_set(&[10, 30], &[3.0, 0.5]).unwrap();
    assert_eq!(m.total_days(), 30);
    let infectious = m.infectious().domain();
    assert!(infectious[25] < infectious[15]);
    assert!((m.r0() - 0.5).abs() < 1e-12);
}

#[test]
fn overloaded_icu_sends_patients_untreated() {
    let mut c = cohort(
        "80+",
        1.0,
        CohortIncidence {
            hosp_rate: 0.5,
            urgent_icu_rate: 0.5,
            crit_rate: 1.0,
            vent_rate: 0.0,
            fatality: 0.1,
        },
    );
    c.capacity = CareCapacity {
        icu_beds: Some(5.0),
        vent_beds: None,
        untreated_fatality: 0.9,
    };
    let s = scenario(10_000, 3.0, 60, vec![c]);
    let mut m = EpiModel::new(&s).unwrap();
    m.set_conservation_check(true);
    m.run().unwrap();

    let cohort = m.cohort("80+").unwrap();
    let icu = cohort.domain(PathState::Icu);
    assert!(icu.iter().all(|c| *c <= 5.0 + 1e-9));
    // while patients are being turned away every bed is in use
    let untreated = cohort.domain(PathState::Untreated);
    let full_days = (1..icu.len()).filter(|d| untreated[*d] > untreated[*d - 1] + 1e-9);
    for day in full_days {
        assert!((icu[day] - 5.0).abs() < 1e-9, "day {} icu {}", day, icu[day]);
    }
    assert!(cohort.compartment(PathState::Untreated).count() > 0.0);
    assert!(approx_eq(m.total_count(), 10_000.0, 1e-9));

    // the same run without a cap leaves nobody untreated
    let mut open = s.clone();
    open.cohorts[0].capacity = CareCapacity::default();
    let mut m = EpiModel::new(&open).unwrap();
    m.run().unwrap();
    let cohort = m.cohort("80+").unwrap();
    assert_eq!(cohort.compartment(PathState::Untreated).count(), 0.0);
    assert!(cohort.domain(PathState::Icu).iter().any(|c| *c > 5.0));
}

#[test]
fn identical_cohorts_split_linearly() {
    let one = scenario(5000, 2.5, 50, vec![cohort("all", 1.0, incidence(0.2))]);
    let two = scenario(
        5000,
        2.5,
        50,
        vec![
            cohort("a", 0.5, incidence(0.2)),
            cohort("b", 0.5, incidence(0.2)),
        ],
    );
    let mut m1 = EpiModel::new(&one).unwrap();
    let mut m2 = EpiModel::new(&two).unwrap();
    m1.run().unwrap();
    m2.run().unwrap();
    let s1 = m1.gather_sums().unwrap();
    let s2 = m2.gather_sums().unwrap();
    for day in 0..s1.days() {
        assert!(approx_eq(s1.hospitalized[day], s2.hospitalized[day], 1e-9));
        assert!(approx_eq(s1.deceased[day], s2.deceased[day], 1e-9));
        assert!(approx_eq(s1.recovered[day], s2.recovered[day], 1e-9));
    }
}

#[test]
fn reset_replays_identically() {
    let s = scenario(
        20_000,
        2.8,
        70,
        vec![
            cohort("0-49", 0.6, incidence(0.05)),
            cohort("50+", 0.4, incidence(0.25)),
        ],
    );
    let mut m = EpiModel::new(&s).unwrap();
    m.run().unwrap();
    let first = m.gather_sums().unwrap();

    m.reset();
    assert_eq!(m.total_days(), 0);
    assert_eq!(m.susceptible().domain().len(), 1);
    assert!((m.r0() - 2.8).abs() < 1e-12);

    m.run().unwrap();
    assert_eq!(m.gather_sums().unwrap(), first);
}

#[test]
fn absorbing_compartments_never_shrink() {
    let s = scenario(
        10_000,
        3.2,
        90,
        vec![
            cohort("young", 0.7, incidence(0.03)),
            cohort("old", 0.3, incidence(0.3)),
        ],
    );
    let mut m = EpiModel::new(&s).unwrap();
    m.run().unwrap();
    for c in m.cohorts() {
        for state in [PathState::Recovered, PathState::Deceased].iter() {
            for pair in c.domain(*state).windows(2) {
                assert!(pair[1] >= pair[0], "{} {}", c.label(), state);
            }
        }
        assert_eq!(c.graph().total_pending(), 0.0);
    }
    for pair in m.susceptible().domain().windows(2) {
        assert!(pair[1] <= pair[0]);
    }
}

#[test]
fn invalid_cohort_rates_fail_construction() {
    let bad = CohortIncidence {
        hosp_rate: 0.0,
        urgent_icu_rate: 0.0,
        crit_rate: 0.0,
        vent_rate: 0.0,
        fatality: 0.01,
    };
    let s = scenario(1000, 2.0, 10, vec![cohort("0-9", 1.0, bad)]);
    match EpiModel::new(&s) {
        Err(ModelError::InvalidConfiguration { context, .. }) => assert_eq!(context, "0-9"),
        other => panic!("unexpected {:?}", other.map(|m| m.total_days())),
    }
}
