use std::fmt::Write;

use anyhow::Result;

use crate::config::ListDevicesArgs;
use crate::device;
use crate::device::DeviceReport;
use crate::telemetry::ErmlSource;

pub async fn run_list_devices(args: ListDevicesArgs) -> Result<()> {
    let _guard = utils::logging::init(None);

    let locator = args.telemetry.locator();
    let source = ErmlSource::load(locator.as_ref(), args.telemetry.no_driver)
        .map_err(|e| anyhow::anyhow!("telemetry open failed: {e:?}"))?;

    let reports = tokio::task::spawn_blocking(move || device::collect(&source))
        .await?
        .map_err(|e| anyhow::anyhow!("device poll failed: {e:?}"))?;

    let output = if args.json {
        serde_json::to_string_pretty(&reports)?
    } else {
        render_table(&reports)
    };
    println!("{output}");
    Ok(())
}

fn render_table(reports: &[DeviceReport]) -> String {
    let name_width = reports
        .iter()
        .map(|r| r.name.len())
        .max()
        .unwrap_or(0)
        .max("NAME".len());

    let mut out = format!("{:<4} {:<name_width$} {:<14} HEALTH", "ID", "NAME", "PCI");
    for report in reports {
        let _ = write!(
            out,
            "\n{:<4} {:<name_width$} {:<14} {}",
            report.id,
            report.name,
            report.pci_bus_id,
            report.health.as_str()
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;
    use crate::device::Health;

    fn reports() -> Vec<DeviceReport> {
        vec![
            DeviceReport {
                id: "0".to_string(),
                name: "GCU-T20".to_string(),
                pci_bus_id: "0000:3b:00.0".to_string(),
                health: Health::Healthy,
            },
            DeviceReport {
                id: "1".to_string(),
                name: "GCU-T20".to_string(),
                pci_bus_id: "0000:86:00.0".to_string(),
                health: Health::Unhealthy,
            },
        ]
    }

    #[test]
    fn table_has_one_line_per_device() {
        let table = render_table(&reports());
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "ID   NAME    PCI            HEALTH");
        assert_eq!(lines[1], "0    GCU-T20 0000:3b:00.0   Healthy");
        assert_eq!(lines[2], "1    GCU-T20 0000:86:00.0   Unhealthy");
    }

    #[test]
    fn json_uses_field_names() {
        let json = serde_json::to_value(reports()).expect("serialize");
        assert_eq!(json[1]["pci_bus_id"].as_str(), Some("0000:86:00.0"));
        assert_eq!(json[1]["health"].as_str(), Some("Unhealthy"));
    }
}
