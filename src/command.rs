use std::process::Command;

use log::debug;

use crate::error::{Error, Result};

fn program_name(cmd: &Command) -> String {
    cmd.get_program().to_string_lossy().into_owned()
}

/// Run `cmd` to completion and return its stdout; a non-zero exit is an error
/// carrying the captured stderr.
pub(crate) fn checked_output(cmd: &mut Command) -> Result<Vec<u8>> {
    debug!("exec: {cmd:?}");
    let program = program_name(cmd);
    let output = cmd.output().map_err(|source| Error::Spawn {
        program: program.clone(),
        source,
    })?;

    if !output.status.success() {
        return Err(Error::CommandFailed {
            program,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stdout_is_returned_on_success() {
        let out = checked_output(Command::new("sh").args(["-c", "printf hello"])).unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn non_zero_exit_carries_stderr() {
        let err = checked_output(Command::new("sh").args(["-c", "echo boom >&2; exit 3"]))
            .unwrap_err();
        match err {
            Error::CommandFailed {
                program,
                status,
                stderr,
            } => {
                assert_eq!(program, "sh");
                assert_eq!(status.code(), Some(3));
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let err = checked_output(&mut Command::new("/nonexistent/lttng-ust-bench-tool")).unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
    }
}
