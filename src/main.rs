use image_migrator::cli::{Args, Runner};
use image_migrator::logging::{self, Verbosity};

#[tokio::main]
async fn main() {
    let args = Args::parse_args();
    logging::init(Verbosity::from_flags(args.verbose, args.quiet));

    let runner = match Runner::from_args(&args) {
        Ok(runner) => runner,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    };

    let cancel = runner.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling in-flight migrations");
            cancel.cancel();
        }
    });

    match runner.run().await {
        Ok(report) if report.is_success() => {}
        Ok(_) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
