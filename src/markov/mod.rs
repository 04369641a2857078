/////////////////////////////////////////////////////////////////////////////////////
//
// Contagion paths model
//
// markov module
//
// amortized Markov compartments: each compartment holds a population count
// and bleeds it out through weighted exits so that, on average, the whole
// count has left after `period` days.
//
// Every day runs in two phases
//    1. store_pending / pass_downstream - deltas accumulate in pending buffers,
//       all computed from the same snapshot of counts
//    2. apply_pending - every compartment commits its buffer exactly once
//
////////////////////////////////////////////////////////////////////////////////////

use crate::error::ModelError;

// Index of a compartment inside the StateGraph that created it.
// Ids are graph-local: lookups and day-stepping calls index the arena directly
// and panic on an id issued by another graph.  Edge and capacity setup validate ids.
#[derive(Hash, Debug, Copy, Clone, Eq, PartialEq)]
pub struct StateId(usize);

// ExitState ------------------------------------------------------------------------------------------
#[derive(Debug, Clone)]
pub struct ExitState {
    pub distribution: f64, // raw weight, share of outgoing mass
    pub probability: f64,  // per-day rate, set by normalize_states_over_period
    pub target: StateId,
}

impl ExitState {
    fn new(target: StateId, distribution: f64) -> ExitState {
        ExitState {
            distribution,
            probability: 0.0,
            target,
        }
    }

    fn portion(&self, count: f64) -> f64 {
        count * self.probability
    }
}

// Admission control on a compartment's inflow
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum OverflowPolicy {
    AdmitAll,
    HardCap { capacity: f64, overflow: StateId },
}

// ProbState ------------------------------------------------------------------------------------------
#[derive(Debug, Clone)]
pub struct ProbState {
    name: String,
    period: f64, // mean dwell time in days, 0 for a reservoir
    initial: f64,
    count: f64,
    pending: f64,
    domain: Vec<f64>, // one count per simulated day, starting with the initial count
    exits: Vec<ExitState>,
    overflow: OverflowPolicy,
}

impl ProbState {
    pub fn new(name: &str, period: f64, count: f64) -> ProbState {
        ProbState {
            name: String::from(name),
            period,
            initial: count,
            count,
            pending: 0.0,
            domain: vec![count],
            exits: Vec::new(),
            overflow: OverflowPolicy::AdmitAll,
        }
    }

    // recovered, deceased: nothing ever leaves
    pub fn absorbing(name: &str) -> ProbState {
        ProbState::new(name, 0.0, 0.0)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn period(&self) -> f64 {
        self.period
    }
    pub fn count(&self) -> f64 {
        self.count
    }
    pub fn pending(&self) -> f64 {
        self.pending
    }
    pub fn domain(&self) -> &[f64] {
        &self.domain
    }
    pub fn exits(&self) -> &[ExitState] {
        &self.exits
    }
    pub fn overflow(&self) -> OverflowPolicy {
        self.overflow
    }
    pub fn is_absorbing(&self) -> bool {
        self.exits.is_empty()
    }

    fn add_exit_state(&mut self, target: StateId, weight: f64) -> Result<(), ModelError> {
        if !weight.is_finite() || weight < 0.0 {
            return Err(ModelError::config(
                &self.name,
                format!("exit weight {} must be a finite value >= 0", weight),
            ));
        }
        self.exits.push(ExitState::new(target, weight));
        Ok(())
    }

    // probability = weight / (sum of weights * period)
    // so that sum(probability) * period == 1
    pub fn normalize_states_over_period(&mut self) -> Result<(), ModelError> {
        if self.exits.is_empty() {
            return Ok(());
        }
        if !self.period.is_finite() || self.period <= 0.0 {
            return Err(ModelError::config(
                &self.name,
                format!("period {} must be > 0 for a compartment with exits", self.period),
            ));
        }
        let total: f64 = self.exits.iter().map(|e| e.distribution).sum();
        if total <= 0.0 {
            return Err(ModelError::config(&self.name, "exit weights sum to zero"));
        }
        for exit in self.exits.iter_mut() {
            exit.probability = exit.distribution / (total * self.period);
        }
        Ok(())
    }

    // Adds delta to the pending buffer.  Under a hard cap, the share of a positive
    // delta that would lift count + pending above capacity is returned for redirection.
    fn store_pending(&mut self, delta: f64) -> Option<(StateId, f64)> {
        self.pending += delta;
        match self.overflow {
            OverflowPolicy::HardCap { capacity, overflow } if delta > 0.0 => {
                let load = self.count + self.pending;
                if load > capacity {
                    let spill = (load - capacity).min(delta);
                    self.pending -= spill;
                    Some((overflow, spill))
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    // one day's outflow per exit, taken from the committed count
    fn outflows(&self) -> Vec<(StateId, f64)> {
        self.exits
            .iter()
            .map(|e| (e.target, e.portion(self.count)))
            .collect()
    }

    pub fn apply_pending(&mut self) {
        self.count += self.pending;
        self.pending = 0.0;
        self.domain.push(self.count);
    }

    pub fn reset(&mut self, count: f64) {
        self.count = count;
        self.pending = 0.0;
        self.domain = vec![count];
    }
}

// StateGraph -----------------------------------------------------------------------------------------
//
// Owns a set of compartments and the exit edges between them.  Compartments never
// touch each other's fields: all cross-compartment traffic goes through store_pending.
#[derive(Debug, Clone, Default)]
pub struct StateGraph {
    states: Vec<ProbState>,
}

impl StateGraph {
    pub fn new() -> StateGraph {
        StateGraph { states: Vec::new() }
    }

    pub fn add_state(&mut self, state: ProbState) -> StateId {
        self.states.push(state);
        StateId(self.states.len() - 1)
    }

    pub fn state(&self, id: StateId) -> &ProbState {
        &self.states[id.0]
    }

    pub fn states(&self) -> &[ProbState] {
        &self.states
    }

    fn check_id(&self, id: StateId) -> Result<(), ModelError> {
        if id.0 < self.states.len() {
            Ok(())
        } else {
            Err(ModelError::config(
                "state graph",
                format!("unknown compartment index {}", id.0),
            ))
        }
    }

    pub fn add_exit_state(
        &mut self,
        from: StateId,
        target: StateId,
        weight: f64,
    ) -> Result<(), ModelError> {
        self.check_id(from)?;
        self.check_id(target)?;
        if from == target {
            return Err(ModelError::config(
                &self.states[from.0].name,
                "a compartment cannot exit into itself",
            ));
        }
        self.states[from.0].add_exit_state(target, weight)
    }

    pub fn normalize_states_over_period(&mut self, id: StateId) -> Result<(), ModelError> {
        self.check_id(id)?;
        self.states[id.0].normalize_states_over_period()
    }

    // Attach a hard cap; excess inflow goes to `overflow`.
    // Rejects caps whose overflow chain leads back to `id`.
    pub fn set_capacity(
        &mut self,
        id: StateId,
        capacity: f64,
        overflow: StateId,
    ) -> Result<(), ModelError> {
        self.check_id(id)?;
        self.check_id(overflow)?;
        if !capacity.is_finite() || capacity < 0.0 {
            return Err(ModelError::config(
                &self.states[id.0].name,
                format!("capacity {} must be a finite value >= 0", capacity),
            ));
        }
        let mut cursor = overflow;
        loop {
            if cursor == id {
                return Err(ModelError::config(
                    &self.states[id.0].name,
                    "overflow chain loops back to the capped compartment",
                ));
            }
            match self.states[cursor.0].overflow {
                OverflowPolicy::HardCap { overflow: next, .. } => cursor = next,
                OverflowPolicy::AdmitAll => break,
            }
        }
        self.states[id.0].overflow = OverflowPolicy::HardCap { capacity, overflow };
        Ok(())
    }

    pub fn store_pending(&mut self, id: StateId, delta: f64) {
        let mut target = id;
        let mut amount = delta;
        while let Some((next, spill)) = self.states[target.0].store_pending(amount) {
            target = next;
            amount = spill;
        }
    }

    pub fn pass_downstream(&mut self, id: StateId) {
        for (target, portion) in self.states[id.0].outflows() {
            self.states[id.0].pending -= portion;
            self.store_pending(target, portion);
        }
    }

    pub fn apply_pending(&mut self, id: StateId) {
        self.states[id.0].apply_pending();
    }

    // drains a routing buffer without committing it
    pub fn take_pending(&mut self, id: StateId) -> f64 {
        let state = &mut self.states[id.0];
        let value = state.pending;
        state.pending = 0.0;
        value
    }

    // every compartment back to its construction-time count
    pub fn reset(&mut self) {
        for state in self.states.iter_mut() {
            let initial = state.initial;
            state.reset(initial);
        }
    }

    pub fn total_count(&self) -> f64 {
        self.states.iter().map(|s| s.count).sum()
    }

    pub fn total_pending(&self) -> f64 {
        self.states.iter().map(|s| s.pending).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(period: f64) -> (StateGraph, StateId, StateId, StateId) {
        let mut g = StateGraph::new();
        let a = g.add_state(ProbState::new("a", period, 100.0));
        let b = g.add_state(ProbState::absorbing("b"));
        let c = g.add_state(ProbState::absorbing("c"));
        (g, a, b, c)
    }

    #[test]
    fn normalization_spreads_weights_over_period() {
        let (mut g, a, b, c) = chain(4.0);
        g.add_exit_state(a, b, 3.0).unwrap();
        g.add_exit_state(a, c, 1.0).unwrap();
        g.normalize_states_over_period(a).unwrap();

        let exits = g.state(a).exits();
        assert!((exits[0].probability - 0.1875).abs() < 1e-12);
        assert!((exits[1].probability - 0.0625).abs() < 1e-12);
        let sum: f64 = exits.iter().map(|e| e.probability).sum();
        assert!((sum * 4.0 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn zero_period_with_exits_is_rejected() {
        let (mut g, a, b, _) = chain(0.0);
        g.add_exit_state(a, b, 1.0).unwrap();
        match g.normalize_states_over_period(a) {
            Err(ModelError::InvalidConfiguration { context, .. }) => assert_eq!(context, "a"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn zero_period_without_exits_is_fine() {
        let mut s = ProbState::new("susceptible", 0.0, 10.0);
        assert!(s.normalize_states_over_period().is_ok());
    }

    #[test]
    fn negative_weight_and_self_loop_are_rejected() {
        let (mut g, a, b, _) = chain(2.0);
        assert!(g.add_exit_state(a, b, -1.0).is_err());
        assert!(g.add_exit_state(a, a, 1.0).is_err());
    }

    #[test]
    fn pass_downstream_only_touches_pending() {
        let (mut g, a, b, _) = chain(5.0);
        g.add_exit_state(a, b, 1.0).unwrap();
        g.normalize_states_over_period(a).unwrap();

        g.pass_downstream(a);
        assert_eq!(g.state(a).count(), 100.0);
        assert!((g.state(a).pending() + 20.0).abs() < 1e-12);
        assert!((g.state(b).pending() - 20.0).abs() < 1e-12);

        g.apply_pending(a);
        g.apply_pending(b);
        assert!((g.state(a).count() - 80.0).abs() < 1e-12);
        assert!((g.state(b).count() - 20.0).abs() < 1e-12);
        assert_eq!(g.state(a).domain().len(), 2);
        assert_eq!(g.state(a).pending(), 0.0);
    }

    #[test]
    fn outflow_uses_the_committed_snapshot() {
        // inflow stored before pass_downstream must not leak out the same day
        let (mut g, a, b, _) = chain(2.0);
        g.add_exit_state(a, b, 1.0).unwrap();
        g.normalize_states_over_period(a).unwrap();
        g.store_pending(a, 50.0);
        g.pass_downstream(a);
        assert!((g.state(b).pending() - 50.0).abs() < 1e-12);
        assert!((g.state(a).pending() - 0.0).abs() < 1e-12);
    }

    #[test]
    fn hard_cap_redirects_excess() {
        let mut g = StateGraph::new();
        let icu = g.add_state(ProbState::new("icu", 10.0, 8.0));
        let spill = g.add_state(ProbState::absorbing("untreated"));
        g.set_capacity(icu, 10.0, spill).unwrap();

        g.store_pending(icu, 5.0);
        assert!((g.state(icu).pending() - 2.0).abs() < 1e-12);
        assert!((g.state(spill).pending() - 3.0).abs() < 1e-12);

        // outflow never spills
        g.store_pending(icu, -1.0);
        assert!((g.state(icu).pending() - 1.0).abs() < 1e-12);
        assert!((g.state(spill).pending() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn overflow_chains_cascade_and_loops_are_rejected() {
        let mut g = StateGraph::new();
        let a = g.add_state(ProbState::new("a", 1.0, 0.0));
        let b = g.add_state(ProbState::new("b", 1.0, 0.0));
        let c = g.add_state(ProbState::absorbing("c"));
        g.set_capacity(a, 1.0, b).unwrap();
        g.set_capacity(b, 2.0, c).unwrap();
        assert!(g.set_capacity(c, 0.0, a).is_err());

        g.store_pending(a, 10.0);
        assert!((g.state(a).pending() - 1.0).abs() < 1e-12);
        assert!((g.state(b).pending() - 2.0).abs() < 1e-12);
        assert!((g.state(c).pending() - 7.0).abs() < 1e-12);
    }

    #[test]
    fn reset_restores_initial_domain() {
        let (mut g, a, b, _) = chain(2.0);
        g.add_exit_state(a, b, 1.0).unwrap();
        g.normalize_states_over_period(a).unwrap();
        for _ in 0..3 {
            g.pass_downstream(a);
            g.apply_pending(a);
            g.apply_pending(b);
        }
        g.reset();
        assert_eq!(g.state(a).domain(), &[100.0][..]);
        assert_eq!(g.state(b).domain(), &[0.0][..]);
        assert_eq!(g.total_count(), 100.0);
    }

    #[test]
    fn foreign_ids_are_rejected_at_setup() {
        let mut big = StateGraph::new();
        for i in 0..4 {
            big.add_state(ProbState::absorbing(&format!("s{}", i)));
        }
        let foreign = big.add_state(ProbState::absorbing("s4"));
        let (mut g, a, _, _) = chain(1.0);
        assert!(g.add_exit_state(a, foreign, 1.0).is_err());
        assert!(g.set_capacity(a, 1.0, foreign).is_err());
        assert!(g.normalize_states_over_period(foreign).is_err());
    }

    #[test]
    #[should_panic]
    fn foreign_id_panics_when_stepping() {
        let mut big = StateGraph::new();
        for i in 0..4 {
            big.add_state(ProbState::absorbing(&format!("s{}", i)));
        }
        let foreign = big.add_state(ProbState::absorbing("s4"));
        let (mut g, _, _, _) = chain(1.0);
        g.store_pending(foreign, 1.0);
    }

    #[test]
    fn take_pending_drains_buffer() {
        let (mut g, a, _, _) = chain(1.0);
        g.store_pending(a, 4.5);
        assert_eq!(g.take_pending(a), 4.5);
        assert_eq!(g.state(a).pending(), 0.0);
        assert_eq!(g.state(a).count(), 100.0);
    }
}
