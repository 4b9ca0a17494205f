//! xfg CLI entry point
//!
//! A single-purpose invocation: load a sync spec, reconcile every repo it
//! names, print a summary, exit non-zero if anything failed.

use std::collections::HashMap;
use std::process::ExitCode;

use clap::Parser;

use xfg::cli::{Cli, Output};
use xfg::config::template::run_date_now;
use xfg::config::{load_spec_file, ConfigError, MergeMode, PrMergeStrategy};
use xfg::reconcile::ReconcileOptions;
use xfg::runner::Runner;
use xfg::telemetry::{init_telemetry, TelemetryConfig};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let telemetry = TelemetryConfig::default();
    let _guard = match init_telemetry(&telemetry) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("failed to initialize logging: {err}");
            return ExitCode::from(2);
        }
    };

    let runtime_env: HashMap<String, String> = HashMap::new();
    let spec = match load_spec_file(&cli.config, &runtime_env) {
        Ok(spec) => spec,
        Err(err) => {
            Output::error(&format!("invalid spec: {}", describe_config_error(&err)));
            return ExitCode::from(1);
        }
    };

    let work_dir = cli
        .work_dir
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join(format!("xfg-{}", sanitize_for_tmp(&spec.id))));

    let mut spec = spec;
    if cli.merge.is_some() || cli.merge_strategy.is_some() || cli.delete_branch.is_some() {
        apply_overrides(&mut spec, &cli);
    }

    let opts = ReconcileOptions {
        config_id: spec.id.clone(),
        work_dir,
        dry_run: cli.dry_run,
        branch_override: cli.branch.clone(),
        github_hosts: spec.github_hosts.clone(),
        pr_template: spec.pr_template.clone(),
        no_delete: cli.no_delete,
        run_date: run_date_now(),
        retries: cli.retries,
    };

    let runner = Runner::new(&spec, opts, cli.parallel);
    let summary = tokio_run(runner.run());
    ExitCode::from(summary.exit_code() as u8)
}

fn apply_overrides(spec: &mut xfg::config::normalize::NormalizedSpec, cli: &Cli) {
    for repo in &mut spec.repos {
        if let Some(merge) = cli.merge {
            repo.pr_options.merge = MergeMode::from(merge);
        }
        if let Some(strategy) = cli.merge_strategy {
            repo.pr_options.merge_strategy = PrMergeStrategy::from(strategy);
        }
        if let Some(delete_branch) = cli.delete_branch {
            repo.pr_options.delete_branch = delete_branch;
        }
    }
}

fn describe_config_error(err: &ConfigError) -> String {
    err.to_string()
}

fn sanitize_for_tmp(id: &str) -> String {
    xfg::git::branch::sanitize(id)
}

fn tokio_run<F: std::future::Future>(fut: F) -> F::Output {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to start the async runtime")
        .block_on(fut)
}
