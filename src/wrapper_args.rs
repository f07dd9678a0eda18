//! Wrapper command-line contract
//!
//! The installer encodes a [`ServiceConfiguration`] into the service's binary path as
//! exactly [`FIELD_COUNT`] individually double-quoted fields. The wrapper process decodes
//! its argv in the same fixed order. The field order must never change: every installed
//! service carries it in its SCM record.

use crate::error::{Result, ServyError};
use crate::service::{PreLaunchConfig, ServiceConfiguration};
use std::path::Path;

/// Number of positional fields, wrapper executable included
pub const FIELD_COUNT: usize = 23;

const FIELD_NAMES: [&str; FIELD_COUNT] = [
    "wrapper-exe-path",
    "real-exe-path",
    "real-args",
    "working-directory",
    "process-priority",
    "stdout-path",
    "stderr-path",
    "rotation-size-bytes",
    "heartbeat-interval",
    "max-failed-checks",
    "recovery-action",
    "service-name",
    "max-restart-attempts",
    "environment-variables",
    "pre-launch-exe-path",
    "pre-launch-working-directory",
    "pre-launch-args",
    "pre-launch-environment-variables",
    "pre-launch-stdout-path",
    "pre-launch-stderr-path",
    "pre-launch-timeout",
    "pre-launch-retry-attempts",
    "pre-launch-ignore-failure",
];

/// Build the service binary path for `config`, launched through `wrapper_exe`
pub fn encode(wrapper_exe: &Path, config: &ServiceConfiguration) -> String {
    fields(wrapper_exe, config)
        .iter()
        .map(|field| quote(field))
        .collect::<Vec<_>>()
        .join(" ")
}

/// The raw (unquoted) field values, in contract order
pub fn fields(wrapper_exe: &Path, config: &ServiceConfiguration) -> Vec<String> {
    let pre = config.pre_launch.as_ref();
    let opt = |value: &Option<String>| value.clone().unwrap_or_default();

    vec![
        wrapper_exe.to_string_lossy().into_owned(),
        config.executable_path.clone(),
        config.arguments.clone(),
        opt(&config.working_directory),
        config.priority.to_string(),
        opt(&config.stdout_path),
        opt(&config.stderr_path),
        config.effective_rotation_size().to_string(),
        config.effective_heartbeat_interval().to_string(),
        config.max_failed_checks.to_string(),
        config.recovery_action.to_string(),
        config.name.clone(),
        config.max_restart_attempts.to_string(),
        format_environment(&config.environment_variables),
        pre.map(|p| p.exe_path.clone()).unwrap_or_default(),
        pre.map(|p| opt(&p.working_directory)).unwrap_or_default(),
        pre.map(|p| p.args.clone()).unwrap_or_default(),
        pre.map(|p| format_environment(&p.env)).unwrap_or_default(),
        pre.map(|p| opt(&p.stdout_path)).unwrap_or_default(),
        pre.map(|p| opt(&p.stderr_path)).unwrap_or_default(),
        pre.map(|p| p.timeout_seconds.to_string()).unwrap_or_default(),
        pre.map(|p| p.retry_attempts.to_string()).unwrap_or_default(),
        pre.map(|p| p.ignore_failure.to_string()).unwrap_or_default(),
    ]
}

/// Decode the wrapper's argv (program path first) back into a configuration.
///
/// Fields that are not part of the contract (description, start type, max rotations,
/// post-launch, stop timeout) keep their defaults; the wrapper fills them in from the
/// service repository.
pub fn decode(argv: &[String]) -> Result<ServiceConfiguration> {
    if argv.len() != FIELD_COUNT {
        return Err(ServyError::WrapperArgs(format!(
            "expected {} fields, got {}",
            FIELD_COUNT,
            argv.len()
        )));
    }

    let name = argv[11].clone();
    if name.is_empty() {
        return Err(ServyError::WrapperArgs("service-name is empty".to_string()));
    }

    let mut config = ServiceConfiguration::new(name, argv[1].clone());
    config.arguments = argv[2].clone();
    config.working_directory = non_empty(&argv[3]);
    config.priority = argv[4]
        .parse()
        .map_err(|e| field_error(4, &argv[4], e))?;
    config.stdout_path = non_empty(&argv[5]);
    config.stderr_path = non_empty(&argv[6]);

    let rotation_size: u64 = number(argv, 7)?;
    config.rotation_enabled = rotation_size > 0;
    config.rotation_size_bytes = rotation_size;

    let heartbeat: u64 = number(argv, 8)?;
    config.health_enabled = heartbeat > 0;
    config.heartbeat_interval_seconds = heartbeat;
    config.max_failed_checks = number(argv, 9)?;
    config.recovery_action = argv[10]
        .parse()
        .map_err(|e| field_error(10, &argv[10], e))?;
    config.max_restart_attempts = number(argv, 12)?;
    config.environment_variables =
        parse_environment(&argv[13]).map_err(|e| field_error(13, &argv[13], e))?;

    if !argv[14].is_empty() {
        let mut pre = PreLaunchConfig::new(argv[14].clone());
        pre.working_directory = non_empty(&argv[15]);
        pre.args = argv[16].clone();
        pre.env = parse_environment(&argv[17]).map_err(|e| field_error(17, &argv[17], e))?;
        pre.stdout_path = non_empty(&argv[18]);
        pre.stderr_path = non_empty(&argv[19]);
        if !argv[20].is_empty() {
            pre.timeout_seconds = number(argv, 20)?;
        }
        if !argv[21].is_empty() {
            pre.retry_attempts = number(argv, 21)?;
        }
        pre.ignore_failure = match argv[22].to_lowercase().as_str() {
            "" | "false" => false,
            "true" => true,
            other => return Err(field_error(22, other, "expected true or false")),
        };
        config.pre_launch = Some(pre);
    }

    Ok(config)
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn number<T: std::str::FromStr>(argv: &[String], index: usize) -> Result<T> {
    let raw = argv[index].trim();
    let raw = if raw.is_empty() { "0" } else { raw };
    raw.parse()
        .map_err(|_| field_error(index, &argv[index], "invalid number"))
}

fn field_error(index: usize, value: &str, reason: impl std::fmt::Display) -> ServyError {
    ServyError::WrapperArgs(format!(
        "field {} ({}) = '{}': {}",
        index + 1,
        FIELD_NAMES[index],
        value,
        reason
    ))
}

/// Quote one field so the Windows argv parser hands it back unchanged
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    let mut backslashes = 0usize;
    for c in value.chars() {
        match c {
            '\\' => backslashes += 1,
            '"' => {
                out.extend(std::iter::repeat_n('\\', backslashes * 2 + 1));
                out.push('"');
                backslashes = 0;
            }
            _ => {
                out.extend(std::iter::repeat_n('\\', backslashes));
                out.push(c);
                backslashes = 0;
            }
        }
    }
    // backslashes before the closing quote must be doubled
    out.extend(std::iter::repeat_n('\\', backslashes * 2));
    out.push('"');
    out
}

/// Split a command line using the Windows C runtime rules.
///
/// Used to turn the single `real-args` / `pre-launch-args` strings into argv where the
/// OS does not take a raw command line, and to read back encoded binary paths.
pub fn split_command_line(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut in_quotes = false;
    let mut backslashes = 0usize;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                backslashes += 1;
                in_token = true;
            }
            '"' => {
                current.extend(std::iter::repeat_n('\\', backslashes / 2));
                if backslashes % 2 == 1 {
                    current.push('"');
                } else if in_quotes && chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = !in_quotes;
                }
                backslashes = 0;
                in_token = true;
            }
            ' ' | '\t' if !in_quotes => {
                current.extend(std::iter::repeat_n('\\', backslashes));
                backslashes = 0;
                if in_token {
                    args.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            _ => {
                current.extend(std::iter::repeat_n('\\', backslashes));
                backslashes = 0;
                current.push(c);
                in_token = true;
            }
        }
    }
    current.extend(std::iter::repeat_n('\\', backslashes));
    if in_token {
        args.push(current);
    }
    args
}

/// Encode ordered `KEY=VALUE` pairs as `KEY=VALUE;KEY2=VALUE2`.
///
/// A backslash escapes `;`, `=` and itself inside names and values.
pub fn format_environment(vars: &[(String, String)]) -> String {
    fn escape(s: &str) -> String {
        let mut out = String::with_capacity(s.len());
        for c in s.chars() {
            if matches!(c, '\\' | ';' | '=') {
                out.push('\\');
            }
            out.push(c);
        }
        out
    }

    vars.iter()
        .map(|(k, v)| format!("{}={}", escape(k), escape(v)))
        .collect::<Vec<_>>()
        .join(";")
}

/// Inverse of [`format_environment`]
pub fn parse_environment(encoded: &str) -> Result<Vec<(String, String)>> {
    let mut vars = Vec::new();
    let mut key = String::new();
    let mut value = String::new();
    let mut in_value = false;
    let mut chars = encoded.chars();

    let mut finish = |key: &mut String, value: &mut String, in_value: bool| -> Result<()> {
        let k = key.trim().to_string();
        if k.is_empty() && !in_value && value.is_empty() {
            return Ok(());
        }
        if !in_value || k.is_empty() {
            return Err(ServyError::Config(format!(
                "invalid environment variable '{}'",
                key
            )));
        }
        vars.push((k, std::mem::take(value)));
        key.clear();
        Ok(())
    };

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let escaped = chars.next().unwrap_or('\\');
                if in_value {
                    value.push(escaped);
                } else {
                    key.push(escaped);
                }
            }
            '=' if !in_value => in_value = true,
            ';' => {
                finish(&mut key, &mut value, in_value)?;
                in_value = false;
            }
            _ if in_value => value.push(c),
            _ => key.push(c),
        }
    }
    finish(&mut key, &mut value, in_value)?;
    Ok(vars)
}
