/////////////////////////////////////////////////////////////////////////////////////
//
// Contagion paths model
//
// model module
//
// the epidemic front (susceptible -> incubating -> infectious -> diagnosed)
// feeding one clinical pathway graph per age cohort, stepped one day at a time
//
////////////////////////////////////////////////////////////////////////////////////

use crate::error::ModelError;
use crate::markov::{ProbState, StateGraph, StateId};
use crate::pathways::{PathsByAge, SubgroupRates};
use crate::scenario::{validate_r0_set, R0Schedule, Scenario};
use crate::stats::Summary;
use log::debug;

const CONSERVATION_TOLERANCE: f64 = 1e-6; // relative to population

#[derive(Debug, Clone)]
pub struct EpiModel {
    model_name: String,
    population: f64,
    r0: f64,
    beta: f64,
    total_days: usize,
    schedule: R0Schedule,

    front: StateGraph,
    susceptible: StateId,
    incubating: StateId,
    infectious: StateId,
    isolated_holding: StateId, // routing buffer, never committed
    cohorts: Vec<PathsByAge>,

    // aligned with the compartment domains, index 0 being the initial state
    new_infections: Vec<f64>,
    diagnosed: Vec<f64>,

    initial_total: f64,
    conservation_check: bool,
}

impl EpiModel {
    pub fn new(scenario: &Scenario) -> Result<EpiModel, ModelError> {
        scenario.validate()?;

        let mut front = StateGraph::new();
        let susceptible = front.add_state(ProbState::new(
            "susceptible",
            0.0,
            scenario.initial.susceptible,
        ));
        let incubating = front.add_state(ProbState::new(
            "incubating",
            scenario.incubation_period,
            scenario.initial.incubating,
        ));
        let infectious = front.add_state(ProbState::new(
            "infectious",
            scenario.prediagnosis_period,
            scenario.initial.infectious,
        ));
        let isolated_holding = front.add_state(ProbState::absorbing("isolated_holding"));

        front.add_exit_state(incubating, infectious, 1.0)?;
        front.normalize_states_over_period(incubating)?;
        front.add_exit_state(infectious, isolated_holding, 1.0)?;
        front.normalize_states_over_period(infectious)?;

        let mut cohorts = Vec::with_capacity(scenario.cohorts.len());
        for cohort in &scenario.cohorts {
            let rates =
                SubgroupRates::derive(&cohort.label, &cohort.incidence, cohort.population_share)?;
            cohorts.push(PathsByAge::new(
                &cohort.label,
                rates,
                &scenario.timings,
                &cohort.capacity,
            )?);
        }

        let initial_total = front.total_count();
        let mut model = EpiModel {
            model_name: scenario.model_name.clone(),
            population: scenario.population as f64,
            r0: scenario.schedule.initial_r0,
            beta: 0.0,
            total_days: 0,
            schedule: scenario.schedule.clone(),
            front,
            susceptible,
            incubating,
            infectious,
            isolated_holding,
            cohorts,
            new_infections: vec![0.0],
            diagnosed: vec![0.0],
            initial_total,
            conservation_check: cfg!(debug_assertions),
        };
        model.set_r0(scenario.schedule.initial_r0)?;
        Ok(model)
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }
    pub fn population(&self) -> f64 {
        self.population
    }
    pub fn r0(&self) -> f64 {
        self.r0
    }
    pub fn beta(&self) -> f64 {
        self.beta
    }
    pub fn total_days(&self) -> usize {
        self.total_days
    }
    pub fn max_days(&self) -> usize {
        self.schedule.total_days
    }
    pub fn susceptible(&self) -> &ProbState {
        self.front.state(self.susceptible)
    }
    pub fn incubating(&self) -> &ProbState {
        self.front.state(self.incubating)
    }
    pub fn infectious(&self) -> &ProbState {
        self.front.state(self.infectious)
    }
    pub fn cohorts(&self) -> &[PathsByAge] {
        &self.cohorts
    }
    pub fn cohort(&self, label: &str) -> Option<&PathsByAge> {
        self.cohorts.iter().find(|c| c.label() == label)
    }
    pub fn daily_new_infections(&self) -> &[f64] {
        &self.new_infections
    }
    pub fn daily_diagnosed(&self) -> &[f64] {
        &self.diagnosed
    }

    pub fn set_conservation_check(&mut self, on: bool) {
        self.conservation_check = on;
    }

    // population in every compartment, front and cohorts
    pub fn total_count(&self) -> f64 {
        self.front.total_count() + self.cohorts.iter().map(|c| c.total_count()).sum::<f64>()
    }

    pub fn set_r0(&mut self, value: f64) -> Result<(), ModelError> {
        if !value.is_finite() || value < 0.0 {
            return Err(ModelError::Schedule(format!("R0 {} must be >= 0", value)));
        }
        self.r0 = value;
        self.beta = value / self.infectious().period();
        Ok(())
    }

    // One simulated day.  The order of the phases matters, the order among cohorts does not.
    pub fn step_day(&mut self) -> Result<(), ModelError> {
        let new_infections = self.beta * self.susceptible().count() * self.infectious().count()
            / self.population;

        self.front.store_pending(self.susceptible, -new_infections);
        self.front.store_pending(self.incubating, new_infections);
        self.front.pass_downstream(self.incubating);
        self.front.pass_downstream(self.infectious);

        let diagnosed = self.front.take_pending(self.isolated_holding);
        for cohort in self.cohorts.iter_mut() {
            let share = diagnosed * cohort.rates().pop_dist;
            cohort.apply_infections(share);
            cohort.calculate_redistributions();
        }

        self.front.apply_pending(self.susceptible);
        self.front.apply_pending(self.incubating);
        self.front.apply_pending(self.infectious);
        for cohort in self.cohorts.iter_mut() {
            cohort.apply_pending();
        }

        self.total_days += 1;
        self.new_infections.push(new_infections);
        self.diagnosed.push(diagnosed);
        debug!(
            "day {} r0 {:.3}: {:.3} infected, {:.3} diagnosed",
            self.total_days, self.r0, new_infections, diagnosed
        );
        self.verify_day()
    }

    fn verify_day(&self) -> Result<(), ModelError> {
        let tolerance = CONSERVATION_TOLERANCE * self.initial_total.max(1.0);
        let front = self.front.states().iter();
        let paths = self.cohorts.iter().flat_map(|c| c.graph().states().iter());
        for state in front.chain(paths) {
            if state.count() < -tolerance {
                return Err(ModelError::NegativeCount {
                    compartment: String::from(state.name()),
                    day: self.total_days,
                    count: state.count(),
                });
            }
        }

        if self.conservation_check {
            let actual = self.total_count();
            if (actual - self.initial_total).abs() > tolerance {
                return Err(ModelError::Divergence {
                    day: self.total_days,
                    expected: self.initial_total,
                    actual,
                });
            }
        }
        Ok(())
    }

    // Piecewise R0: segment i runs while fewer than date_offsets[i] days are complete,
    // so the day landing on an offset is still computed with the old R0.
    // The whole schedule is checked before the first step.
    pub fn run_r0_set(
        &mut self,
        date_offsets: &[usize],
        r0_values: &[f64],
    ) -> Result<(), ModelError> {
        validate_r0_set(date_offsets, r0_values, self.total_days, self.schedule.total_days)?;
        for (offset, r0) in date_offsets.iter().zip(r0_values) {
            self.set_r0(*r0)?;
            while self.total_days < *offset {
                self.step_day()?;
            }
        }
        Ok(())
    }

    // the scenario's own schedule
    pub fn run(&mut self) -> Result<(), ModelError> {
        let offsets = self.schedule.date_offsets();
        let values = self.schedule.r0_values();
        self.run_r0_set(&offsets, &values)
    }

    // back to the constructed state, ready to replay
    pub fn reset(&mut self) {
        self.front.reset();
        for cohort in self.cohorts.iter_mut() {
            cohort.reset();
        }
        self.total_days = 0;
        self.new_infections = vec![0.0];
        self.diagnosed = vec![0.0];
        self.r0 = self.schedule.initial_r0;
        self.beta = self.r0 / self.infectious().period();
    }

    pub fn gather_sums(&self) -> Result<Summary, ModelError> {
        Summary::gather(self)
    }
}
