// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use cdn_logs_collector::{Args, Collector, CollectorError, Config, S3Source};

#[tokio::main]
pub async fn main() -> ExitCode {
    let args = Args::parse();
    let profile = args.aws_profile.clone();

    let config = match Config::from_args(args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(CollectorError::from(e).exit_code());
        }
    };

    let env_filter = format!(
        "h2=off,hyper=off,rustls=off,aws_config=warn,aws_smithy_runtime=warn,{}",
        config.log_level
    );
    let filter = match EnvFilter::try_new(&env_filter) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("Could not parse log level in configuration: {e}");
            return ExitCode::from(2);
        }
    };
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Setting default subscriber failed: {e}");
    }

    debug!("Logging subsystem enabled");

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, finishing the current object");
            ctrl_c_token.cancel();
        }
    });

    let source = S3Source::new(&config.source).await;
    let collector = Collector::new(source, config).with_cancellation(cancel);

    let mut stderr = std::io::stderr();
    match collector.run(&mut stderr).await {
        Ok(summary) => {
            debug!("Run finished: {:?}", summary);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("ERROR: {e}");
            if let CollectorError::Source(source_error) = &e {
                for hint in source_error.guidance(profile.as_deref()) {
                    eprintln!("{hint}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}
