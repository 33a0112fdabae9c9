// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shows what every machine in a configured hierarchy would do if the given
//! machines asked to be rebooted

use anyhow::anyhow;
use anyhow::bail;
use anyhow::Context;
use camino::Utf8PathBuf;
use clap::Parser;
use reboot_coordinator::params::Entities;
use reboot_coordinator::run_logger;
use reboot_coordinator::Config;
use reboot_coordinator::RebootService;

#[derive(Debug, Parser)]
#[clap(name = "reboot-plan", about = "Plan reboots across a machine hierarchy")]
struct Args {
    /// Path to the reboot coordinator configuration file
    #[clap(name = "CONFIG_FILE_PATH", action)]
    config_file_path: Utf8PathBuf,

    /// Tag of a machine whose agent requests a reboot (e.g. `machine-0`)
    #[clap(long = "request", value_name = "TAG", action)]
    requests: Vec<String>,
}

#[tokio::main]
async fn main() {
    if let Err(error) = do_run().await {
        eprintln!("reboot-plan: {:#}", error);
        std::process::exit(1);
    }
}

async fn do_run() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::from_file(&args.config_file_path)?;
    let log = run_logger(&config).map_err(|e| anyhow!(e))?;
    let service = RebootService::start(&config, &log).map_err(|e| anyhow!(e))?;

    for tag in &args.requests {
        let api = service
            .api_for_machine(tag)
            .with_context(|| format!("connecting as {tag}"))?;
        let results = api.request_reboot(&Entities::from_iter([tag])).await?;
        if let Some(err) = results.one_error() {
            bail!("requesting reboot of {tag}: {}", err.message);
        }
    }

    for node in service.store().nodes() {
        let tag = node.id.tag().to_string();
        let api = service.api_for_machine(&tag)?;
        let results =
            api.get_reboot_action(&Entities::from_iter([&tag])).await?;
        match results.results.into_iter().next() {
            Some(result) => match (result.result, result.error) {
                (Some(action), _) => println!("{}\t{}", node.id, action),
                (None, Some(err)) => {
                    bail!("computing action for {tag}: {}", err.message)
                }
                (None, None) => bail!("no action computed for {tag}"),
            },
            None => bail!("no result for {tag}"),
        }
    }

    service.shutdown();
    Ok(())
}
