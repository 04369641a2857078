/////////////////////////////////////////////////////////////////////////////////////
//
// Contagion paths model
//
// data_managment module
//
// functions to read and write from file system
//
////////////////////////////////////////////////////////////////////////////////////

use crate::error::DataError;
use crate::pathways::{CareCapacity, CohortIncidence, PathTimings};
use crate::scenario::{CohortSpec, InitialValues, R0Schedule, R0Shift, Scenario};
use crate::stats::ObservedSeries;
use log::{info, warn};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use yaml_rust::{Yaml, YamlLoader};

const DEFAULT_TOTAL_DAYS: usize = 160;
const DEFAULT_INCUBATION_PERIOD: f64 = 4.0;
const DEFAULT_PREDIAGNOSIS_PERIOD: f64 = 3.6;

// -------------------------------- File paths -------------------------------------------------------------
pub struct ModelDataStore {
    scenario_file: PathBuf,
    scenario_dir: PathBuf,
}

impl ModelDataStore {
    // <model_root>/scenario.yaml must exist
    // <model_root>/Scenarios is recreated empty
    pub fn new(model_root: &str) -> Result<ModelDataStore, DataError> {
        info!("model root dir: {}", model_root);
        let scenario_file: PathBuf = [model_root, "scenario.yaml"].iter().collect();
        let scenario_dir: PathBuf = [model_root, "Scenarios"].iter().collect();

        if !scenario_file.is_file() {
            return Err(DataError::io(
                &scenario_file,
                std::io::Error::new(std::io::ErrorKind::NotFound, "scenario file not found"),
            ));
        }
        if scenario_dir.exists() {
            fs::remove_dir_all(&scenario_dir).map_err(|e| DataError::io(&scenario_dir, e))?;
        }
        fs::create_dir(&scenario_dir).map_err(|e| DataError::io(&scenario_dir, e))?;

        Ok(ModelDataStore {
            scenario_file,
            scenario_dir,
        })
    }

    pub fn get_model_parms(&self) -> Result<ModelParameters, DataError> {
        let text = fs::read_to_string(&self.scenario_file)
            .map_err(|e| DataError::io(&self.scenario_file, e))?;
        parse_model_parameters(&text)
    }

    fn get_scenario_directory(&self, scenario_number: usize) -> PathBuf {
        self.scenario_dir
            .join(format!("scenario_{:04}", scenario_number))
    }

    pub fn create_scenario_directory(&self, scenario_number: usize) -> Result<PathBuf, DataError> {
        let dir_full_path = self.get_scenario_directory(scenario_number);
        if !dir_full_path.exists() {
            fs::create_dir(&dir_full_path).map_err(|e| DataError::io(&dir_full_path, e))?;
        }
        Ok(dir_full_path)
    }

    pub fn fit_log_path(&self) -> PathBuf {
        self.scenario_dir.join("fitness.csv")
    }
}

// Either a scenario file still to be read, or a scenario already in hand
#[derive(Debug, Clone)]
pub enum ScenarioSource {
    FromFile(PathBuf),
    FromParsed(Scenario),
}

impl ScenarioSource {
    pub fn load(self) -> Result<Scenario, DataError> {
        match self {
            ScenarioSource::FromFile(path) => {
                let text = fs::read_to_string(&path).map_err(|e| DataError::io(&path, e))?;
                Ok(parse_model_parameters(&text)?.base)
            }
            ScenarioSource::FromParsed(scenario) => Ok(scenario),
        }
    }
}

// ----------------------------- Scenario parameters -------------------------------------------------------
//
//  A sweep runs the base scenario once per value, each run differing only in one variable
#[derive(Hash, Debug, Copy, Clone, Eq, PartialEq)]
pub enum SensitivityVariable {
    InitialR0,
    IncubationPeriod,
    PrediagnosisPeriod,
    Population,
}
impl fmt::Display for SensitivityVariable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            SensitivityVariable::InitialR0 => "initial_r0",
            SensitivityVariable::IncubationPeriod => "incubation_period",
            SensitivityVariable::PrediagnosisPeriod => "prediagnosis_period",
            SensitivityVariable::Population => "population",
        };
        write!(f, "{}", name)
    }
}
impl FromStr for SensitivityVariable {
    type Err = ();

    fn from_str(s: &str) -> Result<SensitivityVariable, ()> {
        match s {
            "initial_r0" => Ok(SensitivityVariable::InitialR0),
            "incubation_period" => Ok(SensitivityVariable::IncubationPeriod),
            "prediagnosis_period" => Ok(SensitivityVariable::PrediagnosisPeriod),
            "population" => Ok(SensitivityVariable::Population),
            _ => Err(()),
        }
    }
}

impl SensitivityVariable {
    pub fn apply(self, base: &Scenario, value: f64) -> Scenario {
        let mut scenario = base.clone();
        match self {
            SensitivityVariable::InitialR0 => scenario.schedule.initial_r0 = value,
            SensitivityVariable::IncubationPeriod => scenario.incubation_period = value,
            SensitivityVariable::PrediagnosisPeriod => scenario.prediagnosis_period = value,
            SensitivityVariable::Population => {
                // the seeded cases stay, the susceptible pool absorbs the change
                let population = value.max(0.0).round() as u64;
                scenario.population = population;
                scenario.initial.susceptible = population as f64
                    - scenario.initial.incubating
                    - scenario.initial.infectious;
            }
        }
        scenario
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sweep {
    pub variable: SensitivityVariable,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct ScenarioRun {
    pub number: usize, // 1-based
    pub setting: Option<(SensitivityVariable, f64)>,
    pub scenario: Scenario,
}

pub struct ModelParameters {
    pub model_name: String,
    pub model_description: String,
    pub base: Scenario,
    pub sweep: Option<Sweep>,
    pub observed: Option<ObservedSeries>,
    current_increment: Option<usize>,
}

impl ModelParameters {
    pub fn scenario_count(&self) -> usize {
        match &self.sweep {
            Some(sweep) => sweep.values.len(),
            None => 1,
        }
    }
}

impl fmt::Display for ModelParameters {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Model name {}\nModel description {}\nPopulation {}",
            self.model_name, self.model_description, self.base.population
        )?;
        if let Some(sweep) = &self.sweep {
            write!(
                f,
                "\nSensitivity analysis on {} with values {:?}",
                sweep.variable, sweep.values
            )?;
        }
        Ok(())
    }
}

// issues the base scenario, or one variant per sweep value
impl Iterator for ModelParameters {
    type Item = ScenarioRun;

    fn next(&mut self) -> Option<ScenarioRun> {
        let increment = match self.current_increment {
            Some(increment) => increment + 1,
            None => 0,
        };
        self.current_increment = Some(increment);
        if increment >= self.scenario_count() {
            return None;
        }

        match &self.sweep {
            Some(sweep) => {
                let value = sweep.values[increment];
                Some(ScenarioRun {
                    number: increment + 1,
                    setting: Some((sweep.variable, value)),
                    scenario: sweep.variable.apply(&self.base, value),
                })
            }
            None => Some(ScenarioRun {
                number: 1,
                setting: None,
                scenario: self.base.clone(),
            }),
        }
    }
}

// ----------------------------- YAML parsing --------------------------------------------------------------

fn number(node: &Yaml) -> Option<f64> {
    match node {
        Yaml::Real(_) => node.as_f64(),
        Yaml::Integer(i) => Some(*i as f64),
        _ => None,
    }
}

fn bad_value(key: &str, reason: &str) -> DataError {
    DataError::BadValue {
        key: String::from(key),
        reason: String::from(reason),
    }
}

fn required_f64(node: &Yaml, key: &str) -> Result<f64, DataError> {
    let value = &node[key];
    if value.is_badvalue() {
        return Err(DataError::MissingKey(String::from(key)));
    }
    number(value).ok_or_else(|| bad_value(key, "expected a number"))
}

fn optional_f64(node: &Yaml, key: &str, default: f64) -> Result<f64, DataError> {
    if node[key].is_badvalue() {
        Ok(default)
    } else {
        required_f64(node, key)
    }
}

fn required_count(node: &Yaml, key: &str) -> Result<u64, DataError> {
    let value = &node[key];
    if value.is_badvalue() {
        return Err(DataError::MissingKey(String::from(key)));
    }
    match value.as_i64() {
        Some(i) if i >= 0 => Ok(i as u64),
        _ => Err(bad_value(key, "expected a whole number >= 0")),
    }
}

fn optional_count(node: &Yaml, key: &str, default: u64) -> Result<u64, DataError> {
    if node[key].is_badvalue() {
        Ok(default)
    } else {
        required_count(node, key)
    }
}

fn required_str<'a>(node: &'a Yaml, key: &str) -> Result<&'a str, DataError> {
    let value = &node[key];
    if value.is_badvalue() {
        return Err(DataError::MissingKey(String::from(key)));
    }
    value.as_str().ok_or_else(|| bad_value(key, "expected a string"))
}

fn number_list(node: &Yaml, key: &str) -> Result<Vec<f64>, DataError> {
    let value = &node[key];
    if value.is_badvalue() {
        return Err(DataError::MissingKey(String::from(key)));
    }
    let items = value
        .as_vec()
        .ok_or_else(|| bad_value(key, "expected a list"))?;
    items
        .iter()
        .map(|v| number(v).ok_or_else(|| bad_value(key, "expected a list of numbers")))
        .collect()
}

// errors inside a sub-block name the full key path
fn scoped<T>(scope: &str, result: Result<T, DataError>) -> Result<T, DataError> {
    result.map_err(|e| match e {
        DataError::MissingKey(key) => DataError::MissingKey(format!("{}.{}", scope, key)),
        DataError::BadValue { key, reason } => DataError::BadValue {
            key: format!("{}.{}", scope, key),
            reason,
        },
        other => other,
    })
}

fn parse_timings(node: &Yaml) -> Result<PathTimings, DataError> {
    let d = PathTimings::default();
    Ok(PathTimings {
        home_isolation: optional_f64(node, "home_isolation", d.home_isolation)?,
        ed_prefloor: optional_f64(node, "ed_prefloor", d.ed_prefloor)?,
        ed_preicu: optional_f64(node, "ed_preicu", d.ed_preicu)?,
        noncrit: optional_f64(node, "noncrit", d.noncrit)?,
        preicu: optional_f64(node, "preicu", d.preicu)?,
        icu_nonvent: optional_f64(node, "icu_nonvent", d.icu_nonvent)?,
        icu_vent: optional_f64(node, "icu_vent", d.icu_vent)?,
        posticu: optional_f64(node, "posticu", d.posticu)?,
    })
}

fn parse_cohort(node: &Yaml) -> Result<CohortSpec, DataError> {
    let optional_beds = |key: &str| -> Result<Option<f64>, DataError> {
        if node[key].is_badvalue() {
            Ok(None)
        } else {
            required_f64(node, key).map(Some)
        }
    };
    Ok(CohortSpec {
        label: String::from(required_str(node, "label")?),
        population_share: required_f64(node, "population_share")?,
        incidence: CohortIncidence {
            hosp_rate: required_f64(node, "hosp_rate")?,
            urgent_icu_rate: required_f64(node, "urgent_icu_rate")?,
            crit_rate: required_f64(node, "crit_rate")?,
            vent_rate: required_f64(node, "vent_rate")?,
            fatality: required_f64(node, "fatality")?,
        },
        capacity: CareCapacity {
            icu_beds: optional_beds("icu_beds")?,
            vent_beds: optional_beds("vent_beds")?,
            untreated_fatality: optional_f64(
                node,
                "untreated_fatality",
                CareCapacity::default().untreated_fatality,
            )?,
        },
    })
}

fn parse_schedule(node: &Yaml, total_days: usize) -> Result<R0Schedule, DataError> {
    let initial_r0 = required_f64(node, "initial")?;
    let mut shifts = Vec::new();
    if !node["shifts"].is_badvalue() {
        let items = node["shifts"]
            .as_vec()
            .ok_or_else(|| bad_value("shifts", "expected a list"))?;
        for (index, item) in items.iter().enumerate() {
            let scope = format!("shifts[{}]", index);
            shifts.push(R0Shift {
                day: scoped(&scope, required_count(item, "day"))? as usize,
                r0: scoped(&scope, required_f64(item, "r0"))?,
            });
        }
    }
    Ok(R0Schedule {
        initial_r0,
        shifts,
        total_days,
    })
}

fn parse_sweep(node: &Yaml) -> Result<Option<Sweep>, DataError> {
    if node.is_badvalue() {
        return Ok(None);
    }
    let name = required_str(node, "variable")?;
    let variable: SensitivityVariable = name
        .parse()
        .map_err(|_| bad_value("variable", &format!("unknown sweep variable {}", name)))?;
    let values = number_list(node, "values")?;
    if values.is_empty() {
        warn!("sweep on {} has no values, running the base scenario", variable);
        return Ok(None);
    }
    Ok(Some(Sweep { variable, values }))
}

fn parse_observed(node: &Yaml) -> Result<Option<ObservedSeries>, DataError> {
    if node.is_badvalue() {
        return Ok(None);
    }
    Ok(Some(ObservedSeries {
        start_day: required_count(node, "start_day")? as usize,
        hospitalized: number_list(node, "hospitalized")?,
        deceased: number_list(node, "deceased")?,
    }))
}

pub fn parse_model_parameters(text: &str) -> Result<ModelParameters, DataError> {
    // there can be multiple docs in Yaml file.  Only the first one interests us.
    let docs = YamlLoader::load_from_str(text)?;
    let doc = docs
        .get(0)
        .ok_or_else(|| DataError::MissingKey(String::from("model_name")))?;

    let model_name = String::from(required_str(doc, "model_name")?);
    let model_description = if doc["model_description"].is_badvalue() {
        String::new()
    } else {
        String::from(required_str(doc, "model_description")?)
    };
    let population = required_count(doc, "population")?;
    let total_days = optional_count(doc, "total_days", DEFAULT_TOTAL_DAYS as u64)? as usize;

    let iv = &doc["initial_values"];
    let incubating = scoped("initial_values", optional_f64(iv, "incubating", 0.0))?;
    let infectious = scoped("initial_values", optional_f64(iv, "infectious", 1.0))?;
    let susceptible = scoped(
        "initial_values",
        optional_f64(iv, "susceptible", population as f64 - incubating - infectious),
    )?;

    let cohort_nodes = doc["cohorts"]
        .as_vec()
        .ok_or_else(|| DataError::MissingKey(String::from("cohorts")))?;
    let mut cohorts = Vec::with_capacity(cohort_nodes.len());
    for (index, node) in cohort_nodes.iter().enumerate() {
        cohorts.push(scoped(&format!("cohorts[{}]", index), parse_cohort(node))?);
    }

    let base = Scenario {
        model_name: model_name.clone(),
        population,
        initial: InitialValues {
            susceptible,
            incubating,
            infectious,
        },
        incubation_period: optional_f64(doc, "incubation_period", DEFAULT_INCUBATION_PERIOD)?,
        prediagnosis_period: optional_f64(
            doc,
            "prediagnosis_period",
            DEFAULT_PREDIAGNOSIS_PERIOD,
        )?,
        schedule: scoped("r0", parse_schedule(&doc["r0"], total_days))?,
        timings: scoped("timings", parse_timings(&doc["timings"]))?,
        cohorts,
    };

    Ok(ModelParameters {
        model_name,
        model_description,
        base,
        sweep: scoped("sweep", parse_sweep(&doc["sweep"]))?,
        observed: scoped("observed", parse_observed(&doc["observed"]))?,
        current_increment: None,
    })
}

pub fn scenario_from_file(path: &Path) -> Result<Scenario, DataError> {
    ScenarioSource::FromFile(path.to_path_buf()).load()
}
