//! Translation of provider-native metrics into [`ContainerStats`]

use crate::deploy::adapter::RawStats;
use crate::models::deployment::{BlockIoStats, ContainerStats, CpuStats, MemoryStats, NetworkStats};

/// Normalize raw stats. Unparseable fields become zero rather than errors.
pub fn normalize(raw: &RawStats) -> ContainerStats {
    let (mem_used, mem_limit) = parse_pair(&raw.mem_usage);
    let (rx, tx) = parse_pair(&raw.net_io);
    let (read, write) = parse_pair(&raw.block_io);

    ContainerStats {
        container_id: raw.id.clone(),
        cpu: CpuStats {
            percent: parse_percent(&raw.cpu_perc),
        },
        memory: MemoryStats {
            usage_bytes: mem_used,
            limit_bytes: mem_limit,
            percent: parse_percent(&raw.mem_perc),
        },
        network: NetworkStats {
            rx_bytes: rx,
            tx_bytes: tx,
        },
        block_io: BlockIoStats {
            read_bytes: read,
            write_bytes: write,
        },
    }
}

/// "12.5%" -> 12.5
pub fn parse_percent(value: &str) -> f64 {
    value
        .trim()
        .trim_end_matches('%')
        .parse::<f64>()
        .unwrap_or(0.0)
}

/// "1.2kB / 3MiB" -> (1200, 3145728)
pub fn parse_pair(value: &str) -> (u64, u64) {
    let mut parts = value.split('/');
    let first = parts.next().map(parse_size).unwrap_or(0);
    let second = parts.next().map(parse_size).unwrap_or(0);
    (first, second)
}

/// Human-readable size to bytes; decimal (kB, MB) and binary (KiB, MiB)
/// units are both accepted
pub fn parse_size(value: &str) -> u64 {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);
    let Ok(number) = number.parse::<f64>() else {
        return 0;
    };

    let multiplier: f64 = match unit.trim() {
        "" | "B" => 1.0,
        "kB" | "KB" | "k" => 1e3,
        "MB" | "M" => 1e6,
        "GB" | "G" => 1e9,
        "TB" | "T" => 1e12,
        "KiB" | "Ki" => 1024.0,
        "MiB" | "Mi" => 1024.0 * 1024.0,
        "GiB" | "Gi" => 1024.0 * 1024.0 * 1024.0,
        "TiB" | "Ti" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => return 0,
    };
    (number * multiplier).round() as u64
}
