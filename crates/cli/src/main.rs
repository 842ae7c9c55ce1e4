use std::io;
use std::process;

use clap::Parser;
use serde::Serialize;
use stmtprobe_cli::{
    available_scenarios, compare_runs, exit_code, run_all, run_branches, App, Command,
    CompareArgs, Comparison, ConfigError, ListArgs, RunArgs, EXIT_FAILURE, EXIT_OK,
};
use stmtprobe_core::{render, render_divergences, Scenario};
use stmtprobe_scenarios::CatalogParams;
use tracing_subscriber::EnvFilter;

fn main() {
    let app = App::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if app.verbose { "debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let code = match &app.command {
        Command::Run(args) => run(args),
        Command::Compare(args) => compare(args),
        Command::List(args) => list(args),
        Command::Schema => schema(),
    };
    process::exit(code);
}

fn config_failure(error: &ConfigError) -> i32 {
    eprintln!("error: {error}");
    EXIT_FAILURE
}

fn print_json<T: Serialize>(value: &T) -> bool {
    match serde_json::to_string(value) {
        Ok(line) => {
            println!("{line}");
            true
        }
        Err(e) => {
            eprintln!("Failed to serialize output: {e}");
            false
        }
    }
}

fn run(args: &RunArgs) -> i32 {
    let (target, scenarios) = match args
        .target
        .target()
        .and_then(|target| Ok((target, args.scenarios.scenarios()?)))
    {
        Ok(config) => config,
        Err(e) => return config_failure(&e),
    };

    let results = run_all(
        &target,
        &scenarios,
        args.scenarios.timeout(),
        args.scenarios.fail_fast,
    );

    for result in &results {
        if args.scenarios.json {
            if !print_json(result) {
                return EXIT_FAILURE;
            }
        } else {
            println!("{}", render(result));
        }
    }
    exit_code(&results, 0, false)
}

fn compare(args: &CompareArgs) -> i32 {
    let config = args.target.target().and_then(|left| {
        let right = args.other.target(&args.target)?;
        Ok((left, right, args.scenarios.scenarios()?))
    });
    let (left, right, scenarios) = match config {
        Ok(config) => config,
        Err(e) => return config_failure(&e),
    };

    let [left_results, right_results] = run_branches(
        [&left, &right],
        &scenarios,
        args.scenarios.timeout(),
        args.scenarios.fail_fast,
        args.parallel,
    );
    let comparisons = compare_runs(left_results, right_results);

    let mut divergences = 0;
    let mut not_compared = 0;
    for comparison in &comparisons {
        divergences += comparison.divergences.len();
        if !comparison.compared() {
            not_compared += 1;
        }
        if args.scenarios.json {
            if !print_json(comparison) {
                return EXIT_FAILURE;
            }
            continue;
        }
        for run in comparison.runs() {
            println!("{}", render(run));
        }
        match (&comparison.left, &comparison.right) {
            (Some(left), Some(right)) => {
                println!("{}", render_divergences(left, right, &comparison.divergences));
            }
            (Some(_), None) => println!("*** {}: B did not run ***\n", comparison.scenario),
            (None, _) => println!("*** {}: A did not run ***\n", comparison.scenario),
        }
    }
    tracing::info!(
        scenarios = comparisons.len(),
        divergences,
        not_compared,
        "comparison finished"
    );

    let results = comparisons.iter().flat_map(Comparison::runs);
    exit_code(results, divergences, args.fail_on_divergence)
}

fn list(args: &ListArgs) -> i32 {
    let scenarios = match available_scenarios(&CatalogParams::default(), args.scenario_file.as_ref())
    {
        Ok(scenarios) => scenarios,
        Err(e) => return config_failure(&e),
    };

    if args.json {
        return if print_json(&scenarios) {
            EXIT_OK
        } else {
            EXIT_FAILURE
        };
    }
    for scenario in &scenarios {
        println!("{}", scenario.name);
        println!("  {}", scenario.description);
        if !scenario.requires.is_empty() {
            let requires: Vec<String> = scenario.requires.iter().map(ToString::to_string).collect();
            println!("  requires: {}", requires.join(", "));
        }
    }
    EXIT_OK
}

fn schema() -> i32 {
    let schema = schemars::schema_for!(Vec<Scenario>);
    match serde_json::to_string_pretty(&schema) {
        Ok(json) => {
            println!("{json}");
            EXIT_OK
        }
        Err(e) => {
            eprintln!("Failed to serialize schema: {e}");
            EXIT_FAILURE
        }
    }
}
