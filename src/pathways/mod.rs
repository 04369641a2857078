/////////////////////////////////////////////////////////////////////////////////////
//
// Contagion paths model
//
// pathways module
//
// the clinical path followed by diagnosed cases within one age cohort
//
//    isolated ------------------------------------------------> recovered
//    ed_to_floor -> nevercrit ----------------------------------> recovered
//               \-> pre_icu -> icu | icu_vent -> post_icu ------> recovered
//    ed_to_icu -------------> icu | icu_vent -> deceased
//    (icu and icu_vent spill into untreated when capped) -> recovered | deceased
//
////////////////////////////////////////////////////////////////////////////////////

use crate::error::ModelError;
use crate::markov::{ProbState, StateGraph, StateId};
use std::fmt;

// Raw incidence inputs for a cohort.  All are shares in [0,1]
//    hosp_rate        of diagnosed cases who go to hospital
//    urgent_icu_rate  of hospitalized who go straight from ED to ICU
//    crit_rate        of hospitalized who ever need ICU
//    vent_rate        of ICU patients who need a ventilator
//    fatality         of diagnosed cases who die
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CohortIncidence {
    pub hosp_rate: f64,
    pub urgent_icu_rate: f64,
    pub crit_rate: f64,
    pub vent_rate: f64,
    pub fatality: f64,
}

// SubgroupRates --------------------------------------------------------------------------------------
//
// Conditional probabilities at each branch point.  Pairs sum to 1:
//    ed_to_floor + ed_to_icu + selfisolate, nevercrit + floor_to_icu,
//    icu_nonvent + icu_vent, icu_death + icu_recovery
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SubgroupRates {
    pub pop_dist: f64,
    pub p_selfisolate: f64,
    pub p_ed_to_floor: f64,
    pub p_ed_to_icu: f64,
    pub p_nevercrit: f64,
    pub p_floor_to_icu: f64,
    pub p_icu_nonvent: f64,
    pub p_icu_vent: f64,
    pub p_icu_death: f64,
    pub p_icu_recovery: f64,
}

impl SubgroupRates {
    pub fn derive(
        label: &str,
        icd: &CohortIncidence,
        pop_dist: f64,
    ) -> Result<SubgroupRates, ModelError> {
        check_share(label, "population_share", pop_dist)?;
        check_share(label, "hosp_rate", icd.hosp_rate)?;
        check_share(label, "urgent_icu_rate", icd.urgent_icu_rate)?;
        check_share(label, "crit_rate", icd.crit_rate)?;
        check_share(label, "vent_rate", icd.vent_rate)?;
        check_share(label, "fatality", icd.fatality)?;

        let p_selfisolate = 1.0 - icd.hosp_rate;
        let p_ed_to_icu = icd.hosp_rate * icd.urgent_icu_rate;
        let admitted_to_floor = 1.0 - icd.urgent_icu_rate;
        let p_ed_to_floor = icd.hosp_rate * admitted_to_floor;

        // an empty branch gets a fixed conditional instead of 0/0
        let p_nevercrit = conditional(
            label,
            "never-critical share of floor admissions",
            1.0 - icd.crit_rate,
            admitted_to_floor,
            1.0,
        )?;
        let h_icu_all = icd.hosp_rate * icd.crit_rate;
        let p_icu_death = conditional(
            label,
            "ICU death rate",
            icd.fatality,
            h_icu_all,
            0.0,
        )?;

        Ok(SubgroupRates {
            pop_dist,
            p_selfisolate,
            p_ed_to_floor,
            p_ed_to_icu,
            p_nevercrit,
            p_floor_to_icu: 1.0 - p_nevercrit,
            p_icu_nonvent: 1.0 - icd.vent_rate,
            p_icu_vent: icd.vent_rate,
            p_icu_death,
            p_icu_recovery: 1.0 - p_icu_death,
        })
    }
}

fn check_share(label: &str, key: &str, value: f64) -> Result<(), ModelError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ModelError::config(
            label,
            format!("{} = {} is not a share in [0,1]", key, value),
        ))
    }
}

fn conditional(
    label: &str,
    what: &str,
    numerator: f64,
    denominator: f64,
    when_empty: f64,
) -> Result<f64, ModelError> {
    if denominator <= 0.0 {
        if numerator <= 0.0 {
            return Ok(when_empty);
        }
        return Err(ModelError::config(
            label,
            format!("{}: division of {} by zero", what, numerator),
        ));
    }
    let p = numerator / denominator;
    if p > 1.0 + 1e-12 {
        return Err(ModelError::config(
            label,
            format!("{} = {} / {} exceeds 1", what, numerator, denominator),
        ));
    }
    Ok(p.min(1.0))
}

// Dwell times in days --------------------------------------------------------------------------------
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PathTimings {
    pub home_isolation: f64,
    pub ed_prefloor: f64,
    pub ed_preicu: f64,
    pub noncrit: f64,
    pub preicu: f64,
    pub icu_nonvent: f64,
    pub icu_vent: f64,
    pub posticu: f64,
}

impl Default for PathTimings {
    fn default() -> PathTimings {
        PathTimings {
            home_isolation: 14.0,
            ed_prefloor: 1.0,
            ed_preicu: 1.0,
            noncrit: 8.0,
            preicu: 3.0,
            icu_nonvent: 10.0,
            icu_vent: 10.0,
            posticu: 6.0,
        }
    }
}

// Optional bed limits for a cohort.  Turned-away ICU patients wait out an ICU stay
// in `untreated` and die at `untreated_fatality`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CareCapacity {
    pub icu_beds: Option<f64>,
    pub vent_beds: Option<f64>,
    pub untreated_fatality: f64,
}

impl Default for CareCapacity {
    fn default() -> CareCapacity {
        CareCapacity {
            icu_beds: None,
            vent_beds: None,
            untreated_fatality: 1.0,
        }
    }
}

#[derive(Hash, Debug, Copy, Clone, Eq, PartialEq)]
pub enum PathState {
    Isolated,
    EdToFloor,
    EdToIcu,
    NeverCritical,
    PreIcu,
    Icu,
    IcuVent,
    PostIcu,
    Untreated,
    Recovered,
    Deceased,
}

impl PathState {
    pub const ALL: [PathState; 11] = [
        PathState::Isolated,
        PathState::EdToFloor,
        PathState::EdToIcu,
        PathState::NeverCritical,
        PathState::PreIcu,
        PathState::Icu,
        PathState::IcuVent,
        PathState::PostIcu,
        PathState::Untreated,
        PathState::Recovered,
        PathState::Deceased,
    ];

    // emergency department, waiting on a floor or ICU bed
    pub const ED: [PathState; 2] = [PathState::EdToFloor, PathState::EdToIcu];

    // non-ICU ward beds
    pub const FLOOR: [PathState; 3] = [
        PathState::NeverCritical,
        PathState::PreIcu,
        PathState::PostIcu,
    ];

    // Capped nodes discharge before their feeders admit, so the day's leavers
    // free their beds for the day's arrivals.
    const DISCHARGE_ORDER: [PathState; 9] = [
        PathState::Icu,
        PathState::IcuVent,
        PathState::Isolated,
        PathState::EdToFloor,
        PathState::EdToIcu,
        PathState::NeverCritical,
        PathState::PreIcu,
        PathState::PostIcu,
        PathState::Untreated,
    ];

    fn label(self) -> &'static str {
        match self {
            PathState::Isolated => "isolated",
            PathState::EdToFloor => "ed_to_floor",
            PathState::EdToIcu => "ed_to_icu",
            PathState::NeverCritical => "nevercrit",
            PathState::PreIcu => "pre_icu",
            PathState::Icu => "icu",
            PathState::IcuVent => "icu_vent",
            PathState::PostIcu => "post_icu",
            PathState::Untreated => "untreated",
            PathState::Recovered => "recovered",
            PathState::Deceased => "deceased",
        }
    }
}

impl fmt::Display for PathState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

// PathsByAge -----------------------------------------------------------------------------------------
#[derive(Debug, Clone)]
pub struct PathsByAge {
    label: String,
    rates: SubgroupRates,
    graph: StateGraph,
    ids: [StateId; 11], // indexed like PathState::ALL
}

impl PathsByAge {
    pub fn new(
        label: &str,
        rates: SubgroupRates,
        timings: &PathTimings,
        capacity: &CareCapacity,
    ) -> Result<PathsByAge, ModelError> {
        let mut graph = StateGraph::new();
        let mut add = |state: PathState, period: f64| {
            graph.add_state(ProbState::new(
                &format!("{}: {}", label, state),
                period,
                0.0,
            ))
        };
        let isolated = add(PathState::Isolated, timings.home_isolation);
        let ed_to_floor = add(PathState::EdToFloor, timings.ed_prefloor);
        let ed_to_icu = add(PathState::EdToIcu, timings.ed_preicu);
        let nevercrit = add(PathState::NeverCritical, timings.noncrit);
        let pre_icu = add(PathState::PreIcu, timings.preicu);
        let icu = add(PathState::Icu, timings.icu_nonvent);
        let icu_vent = add(PathState::IcuVent, timings.icu_vent);
        let post_icu = add(PathState::PostIcu, timings.posticu);
        let untreated = add(PathState::Untreated, timings.icu_nonvent);
        // recovered and dead are presumed permanent
        let recovered = add(PathState::Recovered, 0.0);
        let deceased = add(PathState::Deceased, 0.0);

        let edges = [
            (isolated, recovered, 1.0),
            (ed_to_floor, nevercrit, rates.p_nevercrit),
            (ed_to_floor, pre_icu, rates.p_floor_to_icu),
            (ed_to_icu, icu, rates.p_icu_nonvent),
            (ed_to_icu, icu_vent, rates.p_icu_vent),
            (nevercrit, recovered, 1.0),
            (pre_icu, icu, rates.p_icu_nonvent),
            (pre_icu, icu_vent, rates.p_icu_vent),
            (icu, deceased, rates.p_icu_death),
            (icu, post_icu, rates.p_icu_recovery),
            (icu_vent, deceased, rates.p_icu_death),
            (icu_vent, post_icu, rates.p_icu_recovery),
            (post_icu, recovered, 1.0),
            (untreated, deceased, capacity.untreated_fatality),
            (untreated, recovered, 1.0 - capacity.untreated_fatality),
        ];
        for (from, to, weight) in edges.iter() {
            graph.add_exit_state(*from, *to, *weight)?;
        }
        let transient = [
            isolated,
            ed_to_floor,
            ed_to_icu,
            nevercrit,
            pre_icu,
            icu,
            icu_vent,
            post_icu,
            untreated,
        ];
        for id in transient.iter() {
            graph.normalize_states_over_period(*id)?;
        }

        if let Some(beds) = capacity.icu_beds {
            graph.set_capacity(icu, beds, untreated)?;
        }
        if let Some(beds) = capacity.vent_beds {
            graph.set_capacity(icu_vent, beds, untreated)?;
        }

        Ok(PathsByAge {
            label: String::from(label),
            rates,
            graph,
            ids: [
                isolated, ed_to_floor, ed_to_icu, nevercrit, pre_icu, icu, icu_vent, post_icu,
                untreated, recovered, deceased,
            ],
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }
    pub fn rates(&self) -> &SubgroupRates {
        &self.rates
    }
    pub fn graph(&self) -> &StateGraph {
        &self.graph
    }

    fn id(&self, state: PathState) -> StateId {
        self.ids[state as usize]
    }

    pub fn compartment(&self, state: PathState) -> &ProbState {
        self.graph.state(self.id(state))
    }

    pub fn domain(&self, state: PathState) -> &[f64] {
        self.compartment(state).domain()
    }

    // Split N newly diagnosed cases between home isolation and the two ED doors
    pub fn apply_infections(&mut self, infections: f64) {
        let isolated = self.id(PathState::Isolated);
        let ed_to_floor = self.id(PathState::EdToFloor);
        let ed_to_icu = self.id(PathState::EdToIcu);
        self.graph
            .store_pending(isolated, infections * self.rates.p_selfisolate);
        self.graph
            .store_pending(ed_to_floor, infections * self.rates.p_ed_to_floor);
        self.graph
            .store_pending(ed_to_icu, infections * self.rates.p_ed_to_icu);
    }

    // outflows all come from the committed counts, only the cap check sees the order
    pub fn calculate_redistributions(&mut self) {
        for state in PathState::DISCHARGE_ORDER.iter() {
            self.graph.pass_downstream(self.id(*state));
        }
    }

    pub fn apply_pending(&mut self) {
        for state in PathState::ALL.iter() {
            let id = self.id(*state);
            self.graph.apply_pending(id);
        }
    }

    pub fn reset(&mut self) {
        self.graph.reset();
    }

    pub fn total_count(&self) -> f64 {
        self.graph.total_count()
    }

    pub fn days_recorded(&self) -> usize {
        self.domain(PathState::Isolated).len()
    }

    // sum of several compartments' domains, day by day
    pub fn combined_domain(&self, states: &[PathState]) -> Vec<f64> {
        let mut combined = vec![0.0; self.days_recorded()];
        for state in states {
            for (total, value) in combined.iter_mut().zip(self.domain(*state)) {
                *total += value;
            }
        }
        combined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn incidence() -> CohortIncidence {
        CohortIncidence {
            hosp_rate: 0.2,
            urgent_icu_rate: 0.25,
            crit_rate: 0.4,
            vent_rate: 0.5,
            fatality: 0.02,
        }
    }

    #[test]
    fn derived_rates_form_complementary_pairs() {
        let r = SubgroupRates::derive("50-59", &incidence(), 0.3).unwrap();
        assert!((r.p_selfisolate + r.p_ed_to_floor + r.p_ed_to_icu - 1.0).abs() < 1e-12);
        assert!((r.p_nevercrit + r.p_floor_to_icu - 1.0).abs() < 1e-12);
        assert!((r.p_icu_nonvent + r.p_icu_vent - 1.0).abs() < 1e-12);
        assert!((r.p_icu_death + r.p_icu_recovery - 1.0).abs() < 1e-12);
        assert!((r.p_ed_to_icu - 0.05).abs() < 1e-12);
        assert!((r.p_nevercrit - 0.8).abs() < 1e-12);
        assert!((r.p_icu_death - 0.25).abs() < 1e-12);
    }

    #[test]
    fn fatality_without_icu_path_fails() {
        let mut icd = incidence();
        icd.hosp_rate = 0.0;
        match SubgroupRates::derive("0-9", &icd, 0.1) {
            Err(ModelError::InvalidConfiguration { context, reason }) => {
                assert_eq!(context, "0-9");
                assert!(reason.contains("ICU death rate"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn empty_branches_get_fixed_conditionals() {
        let icd = CohortIncidence {
            hosp_rate: 0.0,
            urgent_icu_rate: 0.0,
            crit_rate: 0.0,
            vent_rate: 0.0,
            fatality: 0.0,
        };
        let r = SubgroupRates::derive("0-9", &icd, 1.0).unwrap();
        assert_eq!(r.p_selfisolate, 1.0);
        assert_eq!(r.p_icu_death, 0.0);

        let icd = CohortIncidence {
            hosp_rate: 0.5,
            urgent_icu_rate: 1.0,
            crit_rate: 1.0,
            vent_rate: 0.5,
            fatality: 0.1,
        };
        let r = SubgroupRates::derive("80+", &icd, 1.0).unwrap();
        assert_eq!(r.p_nevercrit, 1.0);
        assert_eq!(r.p_ed_to_floor, 0.0);
    }

    #[test]
    fn inconsistent_rates_fail() {
        let mut icd = incidence();
        icd.urgent_icu_rate = 0.9; // more urgent ICU than ever-critical
        assert!(SubgroupRates::derive("x", &icd, 0.5).is_err());

        let mut icd = incidence();
        icd.fatality = 0.5; // deaths exceed ICU admissions
        assert!(SubgroupRates::derive("x", &icd, 0.5).is_err());

        assert!(SubgroupRates::derive("x", &incidence(), 1.5).is_err());
        let mut icd = incidence();
        icd.vent_rate = f64::NAN;
        assert!(SubgroupRates::derive("x", &icd, 0.5).is_err());
    }

    #[test]
    fn every_transient_node_is_normalized_and_terminals_absorb() {
        let r = SubgroupRates::derive("40-49", &incidence(), 1.0).unwrap();
        let p = PathsByAge::new("40-49", r, &PathTimings::default(), &CareCapacity::default())
            .unwrap();
        for state in PathState::ALL.iter() {
            let c = p.compartment(*state);
            match state {
                PathState::Recovered | PathState::Deceased => assert!(c.is_absorbing()),
                _ => {
                    let sum: f64 = c.exits().iter().map(|e| e.probability).sum();
                    assert!((sum * c.period() - 1.0).abs() < 1e-12, "{}", state);
                }
            }
        }
        assert_eq!(p.compartment(PathState::Icu).name(), "40-49: icu");
    }

    #[test]
    fn a_day_conserves_the_cohort() {
        let r = SubgroupRates::derive("40-49", &incidence(), 1.0).unwrap();
        let mut p = PathsByAge::new("40-49", r, &PathTimings::default(), &CareCapacity::default())
            .unwrap();
        let mut injected = 0.0;
        for day in 0..40 {
            let n = if day < 20 { 100.0 } else { 0.0 };
            injected += n;
            p.apply_infections(n);
            p.calculate_redistributions();
            p.apply_pending();
            assert!((p.total_count() - injected).abs() < 1e-9);
        }
        assert_eq!(p.days_recorded(), 41);
        assert!(p.domain(PathState::Deceased)[40] > 0.0);
    }

    #[test]
    fn capped_icu_spills_into_untreated() {
        let icd = CohortIncidence {
            hosp_rate: 1.0,
            urgent_icu_rate: 1.0,
            crit_rate: 1.0,
            vent_rate: 0.0,
            fatality: 0.3,
        };
        let r = SubgroupRates::derive("80+", &icd, 1.0).unwrap();
        let capacity = CareCapacity {
            icu_beds: Some(5.0),
            vent_beds: None,
            untreated_fatality: 1.0,
        };
        let mut p = PathsByAge::new("80+", r, &PathTimings::default(), &capacity).unwrap();
        for _ in 0..10 {
            p.apply_infections(10.0);
            p.calculate_redistributions();
            p.apply_pending();
        }
        assert!(p.domain(PathState::Icu).iter().all(|c| *c <= 5.0 + 1e-9));
        assert!(p.compartment(PathState::Untreated).count() > 0.0);
        assert!((p.total_count() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn overloaded_icu_stays_full() {
        let icd = CohortIncidence {
            hosp_rate: 1.0,
            urgent_icu_rate: 1.0,
            crit_rate: 1.0,
            vent_rate: 0.0,
            fatality: 0.3,
        };
        let r = SubgroupRates::derive("80+", &icd, 1.0).unwrap();
        let capacity = CareCapacity {
            icu_beds: Some(5.0),
            vent_beds: None,
            untreated_fatality: 1.0,
        };
        let mut p = PathsByAge::new("80+", r, &PathTimings::default(), &capacity).unwrap();
        for _ in 0..10 {
            p.apply_infections(10.0);
            p.calculate_redistributions();
            p.apply_pending();
        }
        // admissions start on day 2, each day's discharges are refilled from the queue
        let icu = p.domain(PathState::Icu);
        for (day, count) in icu.iter().enumerate().skip(2) {
            assert!((count - 5.0).abs() < 1e-9, "day {} icu {}", day, count);
        }
    }

    #[test]
    fn ed_and_floor_are_disjoint_ward_groups() {
        for state in PathState::ED.iter() {
            assert!(!PathState::FLOOR.contains(state));
        }
        assert!(!PathState::FLOOR.contains(&PathState::Icu));
        assert_eq!(PathState::ED.len() + PathState::FLOOR.len(), 5);
    }
}
