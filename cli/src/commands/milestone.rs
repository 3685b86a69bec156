use std::path::Path;

use color_eyre::eyre::{eyre, Result, WrapErr};
use tangle_protocol::{Milestone, MilestoneIndex, ProtocolParameters, ProtocolParamsMilestoneOpt};

use crate::cli::MilestoneCommands;

pub fn run(command: MilestoneCommands) -> Result<()> {
    match command {
        MilestoneCommands::Confirm {
            index,
            timestamp,
            announce,
            target,
        } => {
            let timestamp = match timestamp {
                Some(ts) => ts,
                None => u32::try_from(chrono::Utc::now().timestamp())
                    .wrap_err("system clock is outside the milestone timestamp range")?,
            };

            let mut milestone = Milestone::new(index, timestamp);
            if let (Some(path), Some(target)) = (announce, target) {
                milestone = milestone.with_protocol_params(load_announcement(&path, target)?);
            }

            let mut client = super::connect()?;
            let confirmed = client
                .confirm_milestone(milestone)
                .map_err(|e| eyre!("{}", e))?;
            println!("Milestone {} confirmed.", confirmed);
        }
    }
    Ok(())
}

/// Reads protocol parameters from a TOML file and encodes them as an
/// announcement taking effect at `target`.
fn load_announcement(path: &Path, target: MilestoneIndex) -> Result<ProtocolParamsMilestoneOpt> {
    let content = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read {}", path.display()))?;
    parse_announcement(&content, target).wrap_err_with(|| format!("in {}", path.display()))
}

fn parse_announcement(content: &str, target: MilestoneIndex) -> Result<ProtocolParamsMilestoneOpt> {
    let params: ProtocolParameters = toml::from_str(content)?;
    params.validate()?;
    Ok(ProtocolParamsMilestoneOpt::new(target, &params)?)
}

#[cfg(test)]
mod tests {
    use tangle_protocol::DeserializationMode;

    use super::*;

    #[test]
    fn test_parse_announcement_encodes_parameters() {
        let content = r#"
            version = 3
            network_name = "testnet"
            bech32_hrp = "rms"
            min_pow_score = 1500
            below_max_depth = 15
            token_supply = 1813620509061365
        "#;

        let opt = parse_announcement(content, 42).unwrap();
        assert_eq!(opt.target_milestone_index, 42);
        assert_eq!(opt.protocol_version, 3);

        let decoded =
            ProtocolParameters::from_bytes(&opt.params, DeserializationMode::PerformValidation)
                .unwrap();
        assert_eq!(decoded.min_pow_score, 1500);
        assert_eq!(decoded.rent_structure, Default::default());
    }

    #[test]
    fn test_parse_announcement_rejects_invalid_parameters() {
        let content = r#"
            version = 3
            network_name = "testnet"
            bech32_hrp = "RMS"
            min_pow_score = 1500
            below_max_depth = 15
            token_supply = 1
        "#;

        assert!(parse_announcement(content, 42).is_err());
    }
}
