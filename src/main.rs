use clap::Parser;

use sos_collector::cli::Args;
use sos_collector::driver::{self, Outcome};
use sos_collector::prelude::*;

fn main() {
    let args = Args::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to start async runtime");

    let exit_code = runtime.block_on(run(args));
    std::process::exit(exit_code);
}

async fn run(args: Args) -> i32 {
    let confirm = || -> std::io::Result<()> {
        println!("\nPress ENTER to continue, or CTRL-C to quit\n");
        let mut discard = String::new();
        std::io::stdin().read_line(&mut discard)?;
        Ok(())
    };

    match driver::run(args, confirm).await {
        Ok(Outcome::Completed { archive_path, retrieved }) => {
            info!("collection complete, {retrieved} report(s) retrieved");
            println!("The following archive has been created: {}", archive_path.display());
            0
        }
        Ok(Outcome::Interrupted) => {
            eprintln!("\nExiting on user cancel");
            130
        }
        Ok(Outcome::Listed) => 0,
        Err(e) => {
            eprintln!("{e}");
            match e {
                driver::Error::Archive(sos_collector::archive::Error::NothingRetrieved) => 1,
                driver::Error::Archive(sos_collector::archive::Error::Io(_)) => 2,
                driver::Error::NoNodes => 1,
                driver::Error::ClusterOption(_) => 1,
                driver::Error::UnknownClusterType(_) => 1,
                driver::Error::LocalProbeFailed(_) => 1,
                driver::Error::Io(_) => 1,
            }
        }
    }
}
