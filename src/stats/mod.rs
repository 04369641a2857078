/////////////////////////////////////////////////////////////////////////////////////
//
// Contagion paths model
//
// stats module
//
// sums cohort curves into population curves, scores them against observed
// data and writes them out as csv
//
////////////////////////////////////////////////////////////////////////////////////
use crate::error::{DataError, ModelError};
use crate::model::EpiModel;
use crate::pathways::PathState;
use crate::utilities;
use csv::WriterBuilder;
use serde::{Serialize, Serializer};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

// Population-level curves, one value per day from day 0 to total_days
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub susceptible: Vec<f64>,
    pub incubating: Vec<f64>,
    pub infectious: Vec<f64>,
    pub isolated: Vec<f64>,
    pub ed: Vec<f64>,
    pub floor: Vec<f64>, // never-critical, pre- and post-ICU beds
    pub icu: Vec<f64>,
    pub icu_vent: Vec<f64>,
    pub untreated: Vec<f64>,
    pub recovered: Vec<f64>,
    pub deceased: Vec<f64>,
    pub hospitalized: Vec<f64>, // ed + floor + icu + icu_vent
    pub cumulative_diagnosed: Vec<f64>,
}

impl Summary {
    pub fn gather(model: &EpiModel) -> Result<Summary, ModelError> {
        let days = model.susceptible().domain().len();
        let mut isolated = vec![0.0; days];
        let mut ed = vec![0.0; days];
        let mut floor = vec![0.0; days];
        let mut icu = vec![0.0; days];
        let mut icu_vent = vec![0.0; days];
        let mut untreated = vec![0.0; days];
        let mut recovered = vec![0.0; days];
        let mut deceased = vec![0.0; days];

        for cohort in model.cohorts() {
            let label = cohort.label();
            utilities::accumulate(&mut isolated, cohort.domain(PathState::Isolated), label)?;
            utilities::accumulate(&mut ed, &cohort.combined_domain(&PathState::ED), label)?;
            utilities::accumulate(&mut floor, &cohort.combined_domain(&PathState::FLOOR), label)?;
            utilities::accumulate(&mut icu, cohort.domain(PathState::Icu), label)?;
            utilities::accumulate(&mut icu_vent, cohort.domain(PathState::IcuVent), label)?;
            utilities::accumulate(&mut untreated, cohort.domain(PathState::Untreated), label)?;
            utilities::accumulate(&mut recovered, cohort.domain(PathState::Recovered), label)?;
            utilities::accumulate(&mut deceased, cohort.domain(PathState::Deceased), label)?;
        }

        let mut hospitalized = ed.clone();
        utilities::accumulate(&mut hospitalized, &floor, "floor")?;
        utilities::accumulate(&mut hospitalized, &icu, "icu")?;
        utilities::accumulate(&mut hospitalized, &icu_vent, "icu_vent")?;

        let cumulative_diagnosed: Vec<f64> = model
            .daily_diagnosed()
            .iter()
            .scan(0.0, |total, d| {
                *total += d;
                Some(*total)
            })
            .collect();
        if cumulative_diagnosed.len() != days {
            return Err(ModelError::LengthMismatch {
                series: String::from("diagnosed"),
                expected: days,
                actual: cumulative_diagnosed.len(),
            });
        }

        Ok(Summary {
            susceptible: model.susceptible().domain().to_vec(),
            incubating: model.incubating().domain().to_vec(),
            infectious: model.infectious().domain().to_vec(),
            isolated,
            ed,
            floor,
            icu,
            icu_vent,
            untreated,
            recovered,
            deceased,
            hospitalized,
            cumulative_diagnosed,
        })
    }

    pub fn days(&self) -> usize {
        self.susceptible.len()
    }

    // the export columns, in order, for one day
    pub fn row(&self, day: usize) -> SeriesRow {
        SeriesRow {
            susceptible: self.susceptible[day],
            incubating: self.incubating[day],
            infectious: self.infectious[day],
            isolated: self.isolated[day],
            floor: self.floor[day],
            icu: self.icu[day],
            icu_vent: self.icu_vent[day],
            recovered: self.recovered[day],
            deceased: self.deceased[day],
            hospitalized: self.hospitalized[day],
        }
    }
}

// Fitness --------------------------------------------------------------------------------------------

// Observed curves starting on model day `start_day`
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedSeries {
    pub start_day: usize,
    pub hospitalized: Vec<f64>,
    pub deceased: Vec<f64>,
}

// sqrt(sum of squared differences) / mean of the reference
pub fn residual(
    name: &str,
    modeled: &[f64],
    start_day: usize,
    reference: &[f64],
) -> Result<f64, ModelError> {
    if reference.is_empty() {
        return Err(ModelError::DegenerateReference(format!("no observed {}", name)));
    }
    let end = match start_day.checked_add(reference.len()) {
        Some(end) if end <= modeled.len() => end,
        _ => {
            return Err(ModelError::LengthMismatch {
                series: String::from(name),
                expected: start_day.saturating_add(reference.len()),
                actual: modeled.len(),
            })
        }
    };
    let mean = reference.iter().sum::<f64>() / reference.len() as f64;
    if mean <= 0.0 {
        return Err(ModelError::DegenerateReference(format!(
            "observed {} averages {}",
            name, mean
        )));
    }
    let squares: f64 = modeled[start_day..end]
        .iter()
        .zip(reference)
        .map(|(m, r)| (m - r).powi(2))
        .sum();
    Ok(squares.sqrt() / mean)
}

// lower is better
pub fn fitness(summary: &Summary, observed: &ObservedSeries) -> Result<f64, ModelError> {
    let hospitalized = residual(
        "hospitalized",
        &summary.hospitalized,
        observed.start_day,
        &observed.hospitalized,
    )?;
    let deceased = residual(
        "deceased",
        &summary.deceased,
        observed.start_day,
        &observed.deceased,
    )?;
    Ok(hospitalized + deceased)
}

// Output ---------------------------------------------------------------------------------------------

fn six_places<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("{:.6}", value))
}

#[derive(Debug, Copy, Clone, Serialize)]
pub struct SeriesRow {
    #[serde(serialize_with = "six_places")]
    pub susceptible: f64,
    #[serde(serialize_with = "six_places")]
    pub incubating: f64,
    #[serde(serialize_with = "six_places")]
    pub infectious: f64,
    #[serde(serialize_with = "six_places")]
    pub isolated: f64,
    #[serde(serialize_with = "six_places")]
    pub floor: f64,
    #[serde(serialize_with = "six_places")]
    pub icu: f64,
    #[serde(serialize_with = "six_places")]
    pub icu_vent: f64,
    #[serde(serialize_with = "six_places")]
    pub recovered: f64,
    #[serde(serialize_with = "six_places")]
    pub deceased: f64,
    #[serde(serialize_with = "six_places")]
    pub hospitalized: f64,
}

// one headerless row per simulated day
pub struct SeriesLog {
    file_path: PathBuf,
}

impl SeriesLog {
    pub fn new(file_path: &Path) -> SeriesLog {
        SeriesLog {
            file_path: file_path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn write(&self, summary: &Summary) -> Result<(), DataError> {
        let file = File::create(&self.file_path).map_err(|e| DataError::io(&self.file_path, e))?;
        let mut wtr = WriterBuilder::new().has_headers(false).from_writer(file);
        for day in 0..summary.days() {
            wtr.serialize(summary.row(day))?;
        }
        wtr.flush().map_err(|e| DataError::io(&self.file_path, e))?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FitRecord {
    pub scenario: usize,
    pub variable: String,
    pub value: f64,
    pub fitness: f64,
}

// one row per scored scenario, header written on creation
pub struct FitLog {
    file_path: PathBuf,
}

impl FitLog {
    pub fn new(file_path: &Path) -> Result<FitLog, DataError> {
        let file = File::create(file_path).map_err(|e| DataError::io(file_path, e))?;
        let mut wtr = WriterBuilder::new().has_headers(false).from_writer(file);
        wtr.write_record(&["scenario", "variable", "value", "fitness"])?;
        wtr.flush().map_err(|e| DataError::io(file_path, e))?;
        Ok(FitLog {
            file_path: file_path.to_path_buf(),
        })
    }

    pub fn append(&self, record: &FitRecord) -> Result<(), DataError> {
        let file = OpenOptions::new()
            .append(true)
            .open(&self.file_path)
            .map_err(|e| DataError::io(&self.file_path, e))?;
        let mut wtr = WriterBuilder::new().has_headers(false).from_writer(file);
        wtr.serialize(record)?;
        wtr.flush().map_err(|e| DataError::io(&self.file_path, e))?;
        Ok(())
    }
}
