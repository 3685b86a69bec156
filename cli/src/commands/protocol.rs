use color_eyre::eyre::{eyre, Result};
use tangle_protocol::{ProtocolParameters, ProtocolParamsMilestoneOpt, Versions};

use crate::cli::ProtocolCommands;

pub fn run(command: ProtocolCommands) -> Result<()> {
    let mut client = super::connect()?;

    match command {
        ProtocolCommands::Current { json } => {
            let params = client
                .get_protocol_parameters()
                .map_err(|e| eyre!("{}", e))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&params)?);
            } else {
                print_parameters(&params);
            }
        }
        ProtocolCommands::Pending { json } => {
            let pending = client.get_pending_changes().map_err(|e| eyre!("{}", e))?;
            let supported = client
                .get_supported_versions()
                .map_err(|e| eyre!("{}", e))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&pending)?);
            } else {
                print_pending(&pending, &supported);
            }
        }
        ProtocolCommands::Supported { json } => {
            let supported = client
                .get_supported_versions()
                .map_err(|e| eyre!("{}", e))?;
            if json {
                println!("{}", serde_json::to_string(&supported)?);
            } else {
                println!("Supported protocol versions: {}", supported);
            }
        }
    }

    Ok(())
}

fn print_parameters(params: &ProtocolParameters) {
    println!("Protocol Parameters");
    println!("{}", "-".repeat(40));
    println!("Version:         {}", params.version);
    println!("Network:         {}", params.network_name);
    println!("Bech32 HRP:      {}", params.bech32_hrp);
    println!("Min PoW score:   {}", params.min_pow_score);
    println!("Below max depth: {}", params.below_max_depth);
    println!("Token supply:    {}", params.token_supply);
    println!(
        "Rent:            {} per vbyte (data x{}, key x{})",
        params.rent_structure.vbyte_cost,
        params.rent_structure.vbyte_factor_data,
        params.rent_structure.vbyte_factor_key
    );
}

fn print_pending(pending: &[ProtocolParamsMilestoneOpt], supported: &Versions) {
    if pending.is_empty() {
        println!("No pending protocol parameter changes.");
        return;
    }

    println!("{:>10}  {:>7}  {:>9}  {:>6}", "TARGET", "VERSION", "SUPPORTED", "BYTES");
    for change in pending {
        println!(
            "{:>10}  {:>7}  {:>9}  {:>6}",
            change.target_milestone_index,
            change.protocol_version,
            if supported.supports(change.protocol_version) { "yes" } else { "NO" },
            change.params.len()
        );
    }
}
