//! Text rendering for tool results. Identical on every transport.

use std::collections::BTreeMap;
use std::time::Duration;
use svcmgr_core::{ServiceInfo, ServiceType};
use svcmgr_managers::OperationOutcome;

pub fn format_service_info(info: &ServiceInfo) -> String {
    let mut out = String::new();
    out.push_str(&format!("**Service**: {}\n", info.name));
    out.push_str(&format!("**Type**: {}\n", info.service_type));
    out.push_str(&format!("**Status**: {}\n", info.status));
    if !info.description.is_empty() {
        out.push_str(&format!("**Description**: {}\n", info.description));
    }
    if info.pid > 0 {
        out.push_str(&format!("**PID**: {}\n", info.pid));
    }
    if !info.uptime.is_zero() {
        out.push_str(&format!("**Uptime**: {}\n", format_duration(info.uptime)));
    }
    if let Some(changed) = info.last_changed {
        out.push_str(&format!("**Last Changed**: {}\n", changed.format("%Y-%m-%d %H:%M:%S")));
    }
    out
}

/// Count header, then one section per service type in a fixed type order.
pub fn format_services(services: &[ServiceInfo]) -> String {
    if services.is_empty() {
        return "No services found.".to_string();
    }

    let mut by_type: BTreeMap<ServiceType, Vec<&ServiceInfo>> = BTreeMap::new();
    for service in services {
        by_type.entry(service.service_type).or_default().push(service);
    }

    let mut out = format!("Found {} services:\n\n", services.len());
    for (service_type, group) in by_type {
        out.push_str(&format!("## {} Services\n", service_type.title()));
        for service in group {
            out.push_str(&format!("- **{}**: {}", service.name, service.status));
            if !service.description.is_empty() {
                out.push_str(&format!(" - {}", service.description));
            }
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

pub fn format_operation(outcome: &OperationOutcome) -> String {
    format!("{}.\n\n{}", outcome.message, format_service_info(&outcome.service))
}

pub fn format_logs(container: &str, lines: u32, logs: &str) -> String {
    format!("Docker container '{}' logs (last {} lines):\n\n{}", container, lines, logs)
}

/// Render like `1h2m3.5s`, `4m0s`, `250ms`.
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    if nanos < 1_000 {
        return format!("{}ns", nanos);
    }
    if nanos < 1_000_000 {
        return format!("{}µs", fraction(nanos, 1_000, 3));
    }
    if nanos < 1_000_000_000 {
        return format!("{}ms", fraction(nanos, 1_000_000, 6));
    }

    let total = d.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    let seconds = fraction(
        u128::from(seconds) * 1_000_000_000 + u128::from(d.subsec_nanos()),
        1_000_000_000,
        9,
    );
    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

fn fraction(value: u128, unit: u128, digits: usize) -> String {
    let whole = value / unit;
    let rem = value % unit;
    if rem == 0 {
        return whole.to_string();
    }
    let decimals = format!("{:0width$}", rem, width = digits);
    format!("{}.{}", whole, decimals.trim_end_matches('0'))
}
