use color_eyre::eyre::{eyre, Result};

pub fn run(count: u32, compact: bool) -> Result<()> {
    let mut client = super::connect()?;
    client.subscribe().map_err(|e| eyre!("{}", e))?;

    let mut seen = 0u32;
    loop {
        let event = client.next_event().map_err(|e| eyre!("{}", e))?;

        if compact {
            println!("{}", serde_json::to_string(&event)?);
        } else {
            println!("{}", serde_json::to_string_pretty(&event)?);
        }

        seen += 1;
        if count > 0 && seen >= count {
            break;
        }
        if event.is_critical() {
            return Err(eyre!("Node reported a critical error"));
        }
    }

    Ok(())
}
