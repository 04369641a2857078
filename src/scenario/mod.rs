/////////////////////////////////////////////////////////////////////////////////////
//
// Contagion paths model
//
// scenario module
//
// immutable description of one model run: population, initial conditions,
// the piecewise R0 schedule and the age cohorts
//
////////////////////////////////////////////////////////////////////////////////////

use crate::error::ModelError;
use crate::pathways::{CareCapacity, CohortIncidence, PathTimings};
use rand::Rng;
use std::collections::HashSet;

const SHARE_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct InitialValues {
    pub susceptible: f64,
    pub incubating: f64,
    pub infectious: f64,
}

impl InitialValues {
    // everyone susceptible except a single infectious case
    pub fn single_case(population: u64) -> InitialValues {
        InitialValues {
            susceptible: population as f64 - 1.0,
            incubating: 0.0,
            infectious: 1.0,
        }
    }

    pub fn total(&self) -> f64 {
        self.susceptible + self.incubating + self.infectious
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct R0Shift {
    pub day: usize,
    pub r0: f64,
}

// R0 is `initial_r0` until the first shift day, then each shift's r0 until the next.
// The run stops after `total_days`.
#[derive(Debug, Clone, PartialEq)]
pub struct R0Schedule {
    pub initial_r0: f64,
    pub shifts: Vec<R0Shift>,
    pub total_days: usize,
}

impl R0Schedule {
    pub fn constant(r0: f64, total_days: usize) -> R0Schedule {
        R0Schedule {
            initial_r0: r0,
            shifts: Vec::new(),
            total_days,
        }
    }

    // segment end days, the last one being total_days
    pub fn date_offsets(&self) -> Vec<usize> {
        let mut offsets: Vec<usize> = self.shifts.iter().map(|s| s.day).collect();
        offsets.push(self.total_days);
        offsets
    }

    pub fn r0_values(&self) -> Vec<f64> {
        let mut values = vec![self.initial_r0];
        values.extend(self.shifts.iter().map(|s| s.r0));
        values
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        validate_r0_set(&self.date_offsets(), &self.r0_values(), 0, self.total_days)
    }
}

// offsets strictly increasing, none before `start` or past `max_days`
pub fn validate_r0_set(
    date_offsets: &[usize],
    r0_values: &[f64],
    start: usize,
    max_days: usize,
) -> Result<(), ModelError> {
    if date_offsets.is_empty() {
        return Err(ModelError::Schedule(String::from("no segments")));
    }
    if date_offsets.len() != r0_values.len() {
        return Err(ModelError::Schedule(format!(
            "{} day offsets for {} R0 values",
            date_offsets.len(),
            r0_values.len()
        )));
    }
    for (index, r0) in r0_values.iter().enumerate() {
        if !r0.is_finite() || *r0 < 0.0 {
            return Err(ModelError::Schedule(format!(
                "segment {} has R0 {}",
                index, r0
            )));
        }
    }
    if date_offsets[0] < start {
        return Err(ModelError::Schedule(format!(
            "first offset {} is before day {} already simulated",
            date_offsets[0], start
        )));
    }
    for pair in date_offsets.windows(2) {
        if pair[1] <= pair[0] {
            return Err(ModelError::Schedule(format!(
                "offsets not increasing ({} then {})",
                pair[0], pair[1]
            )));
        }
    }
    let last = date_offsets[date_offsets.len() - 1];
    if last > max_days {
        return Err(ModelError::Schedule(format!(
            "offset {} exceeds the {} simulated days",
            last, max_days
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct CohortSpec {
    pub label: String,
    pub population_share: f64,
    pub incidence: CohortIncidence,
    pub capacity: CareCapacity,
}

// Scenario -------------------------------------------------------------------------------------------
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub model_name: String,
    pub population: u64,
    pub initial: InitialValues,
    pub incubation_period: f64,
    pub prediagnosis_period: f64,
    pub schedule: R0Schedule,
    pub timings: PathTimings,
    pub cohorts: Vec<CohortSpec>,
}

impl Scenario {
    pub fn validate(&self) -> Result<(), ModelError> {
        let context = self.model_name.as_str();
        if self.population < 1 {
            return Err(ModelError::config(context, "population must be >= 1"));
        }
        let population = self.population as f64;
        for (key, value) in [
            ("susceptible", self.initial.susceptible),
            ("incubating", self.initial.incubating),
            ("infectious", self.initial.infectious),
        ]
        .iter()
        {
            if !value.is_finite() || *value < 0.0 {
                return Err(ModelError::config(
                    context,
                    format!("initial {} = {} must be >= 0", key, value),
                ));
            }
        }
        if (self.initial.total() - population).abs() > SHARE_TOLERANCE * population {
            return Err(ModelError::config(
                context,
                format!(
                    "initial values sum to {}, population is {}",
                    self.initial.total(),
                    population
                ),
            ));
        }
        for (key, period) in [
            ("incubation_period", self.incubation_period),
            ("prediagnosis_period", self.prediagnosis_period),
            ("home_isolation", self.timings.home_isolation),
            ("ed_prefloor", self.timings.ed_prefloor),
            ("ed_preicu", self.timings.ed_preicu),
            ("noncrit", self.timings.noncrit),
            ("preicu", self.timings.preicu),
            ("icu_nonvent", self.timings.icu_nonvent),
            ("icu_vent", self.timings.icu_vent),
            ("posticu", self.timings.posticu),
        ]
        .iter()
        {
            if !period.is_finite() || *period <= 0.0 {
                return Err(ModelError::config(
                    context,
                    format!("{} = {} must be > 0 days", key, period),
                ));
            }
        }

        if self.cohorts.is_empty() {
            return Err(ModelError::config(context, "no age cohorts defined"));
        }
        let mut labels = HashSet::new();
        for cohort in &self.cohorts {
            if !labels.insert(cohort.label.as_str()) {
                return Err(ModelError::config(
                    context,
                    format!("duplicate cohort '{}'", cohort.label),
                ));
            }
            let share = cohort.population_share;
            if !(0.0..=1.0).contains(&share) {
                return Err(ModelError::config(
                    &cohort.label,
                    format!("population_share = {} is not a share in [0,1]", share),
                ));
            }
            let fatality = cohort.capacity.untreated_fatality;
            if !(0.0..=1.0).contains(&fatality) {
                return Err(ModelError::config(
                    &cohort.label,
                    format!("untreated_fatality = {} is not a share in [0,1]", fatality),
                ));
            }
        }
        let share_total: f64 = self.cohorts.iter().map(|c| c.population_share).sum();
        if (share_total - 1.0).abs() > SHARE_TOLERANCE {
            return Err(ModelError::config(
                context,
                format!("cohort population shares sum to {}, not 1", share_total),
            ));
        }

        self.schedule.validate()
    }
}

// Mutation -------------------------------------------------------------------------------------------
//
// Both return a new scenario and leave the argument untouched.

// jitter each R0 within +-5% of itself and slide the shift days together by
// trunc(u * 6 - 3) days: -2..=2 with no slide twice as likely as any other,
// -3 only when u is exactly 0
pub fn mutate<R: Rng>(scenario: &Scenario, rng: &mut R) -> Scenario {
    let mut next = scenario.clone();
    next.schedule.initial_r0 = jitter(next.schedule.initial_r0, rng);
    for shift in next.schedule.shifts.iter_mut() {
        shift.r0 = jitter(shift.r0, rng);
    }

    let slide = (rng.gen::<f64>() * 6.0 - 3.0) as i64;
    let mut moved = next.schedule.clone();
    let mut in_range = true;
    for shift in moved.shifts.iter_mut() {
        let day = shift.day as i64 + slide;
        if day < 0 {
            in_range = false;
            break;
        }
        shift.day = day as usize;
    }
    if in_range && moved.validate().is_ok() {
        next.schedule = moved;
    }
    next
}

fn jitter<R: Rng>(r0: f64, rng: &mut R) -> f64 {
    let adjust_max = r0 / 10.0;
    let adjusted = r0 + rng.gen::<f64>() * adjust_max - adjust_max / 2.0;
    adjusted.max(0.0)
}

// fresh draw of every shift's R0 in [0, 5)
pub fn randomize_shifts<R: Rng>(scenario: &Scenario, rng: &mut R) -> Scenario {
    let mut next = scenario.clone();
    for shift in next.schedule.shifts.iter_mut() {
        shift.r0 = rng.gen::<f64>() * 5.0;
    }
    next
}
