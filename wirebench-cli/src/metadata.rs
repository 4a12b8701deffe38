//! Run Metadata Collection
//!
//! Captures the configuration a run executed under so a stored baseline
//! can be validated against it later. Git information degrades to
//! "unknown" outside a repository.

use wirebench_report::RunMetadata;

use crate::Settings;

/// Build the metadata block for the current run configuration.
pub fn collect_metadata(settings: &Settings) -> RunMetadata {
    RunMetadata {
        interface: settings.interface.clone(),
        filter: settings.filter.as_str().to_string(),
        threads: settings.threads as u32,
        bpf_buffer_size: settings.buffer_size as u32,
        duration_sec: settings.duration_sec as u32,
        warmup_sec: settings.warmup_sec as u32,
        traffic_mode: settings.traffic.mode.clone(),
        traffic_target: settings.traffic.target.clone(),
        traffic_rate: settings.traffic.rate,
        os: std::env::consts::OS.to_string(),
        git_sha: current_git_sha().unwrap_or_else(|| "unknown".to_string()),
    }
}

/// Short commit hash of the working tree, if inside a git repository.
fn current_git_sha() -> Option<String> {
    let output = std::process::Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let sha = String::from_utf8(output.stdout).ok()?.trim().to_string();
    if sha.is_empty() {
        None
    } else {
        Some(sha)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WirebenchConfig;

    #[test]
    fn test_metadata_reflects_settings() {
        let mut settings = Settings::from_config(&WirebenchConfig::default());
        settings.interface = "lo".to_string();
        settings.threads = 8;
        settings.warmup_sec = 3;
        settings.traffic.mode = "icmp".to_string();
        settings.traffic.target = "127.0.0.1".to_string();
        settings.traffic.rate = 25;

        let metadata = collect_metadata(&settings);
        assert_eq!(metadata.interface, "lo");
        assert_eq!(metadata.threads, 8);
        assert_eq!(metadata.warmup_sec, 3);
        assert_eq!(metadata.traffic_mode, "icmp");
        assert_eq!(metadata.traffic_target, "127.0.0.1");
        assert_eq!(metadata.traffic_rate, 25);
        assert_eq!(metadata.os, std::env::consts::OS);
        assert!(!metadata.git_sha.is_empty());
    }
}
