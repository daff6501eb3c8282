use clap::Parser;
use sidecar_operator::{
    cli::{Command, Opts},
    controller, logging,
};
use snafu::{ResultExt, Snafu};

const APP_NAME: &str = "sidecar-operator";
const LOG_ENV: &str = "SIDECAR_OPERATOR_LOG";

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to initialize logging"))]
    InitializeLogging { source: logging::Error },

    #[snafu(display("failed to create Kubernetes client"))]
    CreateClient { source: kube::Error },
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), Error> {
    let opts = Opts::parse();
    match opts.cmd {
        Command::Run(args) => {
            logging::initialize_logging(LOG_ENV, APP_NAME, args.log_format)
                .context(InitializeLoggingSnafu)?;
            tracing::info!(
                version = env!("CARGO_PKG_VERSION"),
                "starting {APP_NAME}"
            );

            let client = kube::Client::try_default()
                .await
                .context(CreateClientSnafu)?;
            controller::run_controller(client, args).await;
        }
    }

    Ok(())
}
