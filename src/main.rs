use contagion_paths::data_management::ModelDataStore;
use contagion_paths::stats::{self, FitLog, FitRecord, SeriesLog};
use contagion_paths::{DataError, EpiModel};
use log::{error, info};
use std::env;
use std::process;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // process command line arguments (for now just the model root directory location)
    let args: Vec<_> = env::args().collect();
    let model_root = match args.get(1) {
        Some(root) => root,
        None => {
            error!("no model location specified");
            process::exit(1);
        }
    };

    if let Err(e) = run(model_root) {
        error!("{}", e);
        process::exit(1);
    }
}

fn run(model_root: &str) -> Result<(), DataError> {
    // The model data store handles all models inputs and outputs
    let model_data_store = ModelDataStore::new(model_root)?;

    let model_parms = model_data_store.get_model_parms()?;
    info!("--------------------Contagion Paths Model-----------------------");
    info!("{}", model_parms);
    info!(
        "Model run {} scenarios of {} days",
        model_parms.scenario_count(),
        model_parms.base.schedule.total_days
    );

    let observed = model_parms.observed.clone();
    let fit_log = match &observed {
        Some(_) => Some(FitLog::new(&model_data_store.fit_log_path())?),
        None => None,
    };

    // loop around scenarios
    for scenario_run in model_parms {
        info!("Starting scenario {} ----------------------------------------", scenario_run.number);
        let scenario_dir_name = model_data_store.create_scenario_directory(scenario_run.number)?;

        let mut model = EpiModel::new(&scenario_run.scenario)?;
        model.run()?;
        let summary = model.gather_sums()?;

        let series_log = SeriesLog::new(&scenario_dir_name.join("series.csv"));
        series_log.write(&summary)?;
        info!("wrote {}", series_log.path().display());

        if let (Some(observed), Some(fit_log)) = (&observed, &fit_log) {
            let fitness = stats::fitness(&summary, observed)?;
            let (variable, value) = match scenario_run.setting {
                Some((variable, value)) => (variable.to_string(), value),
                None => (String::from("base"), 0.0),
            };
            info!("scenario {} fitness {:.6}", scenario_run.number, fitness);
            fit_log.append(&FitRecord {
                scenario: scenario_run.number,
                variable,
                value,
                fitness,
            })?;
        }
    }
    Ok(())
}
