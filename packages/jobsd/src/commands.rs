//! Operator console commands.

use jobs_core::{JobId, JobStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Enqueue {
        job_type: String,
        subject_id: String,
        attachment_id: Option<String>,
    },
    Status(JobId),
    Cancel(JobId),
    Retry(JobId),
    List(Option<JobStatus>),
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command: {0}")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("invalid status: {0}")]
    InvalidStatus(String),
}

pub const HELP: &str = "\
commands:
  enqueue <type> <subjectId> [attachmentId]
  status <id>
  cancel <id>
  retry <id>
  list [status]
  help
  quit";

impl Command {
    /// Parse one input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Option<Result<Self, CommandError>> {
        let mut words = line.split_whitespace();
        let name = words.next()?;
        let args: Vec<&str> = words.collect();

        Some(match (name, args.as_slice()) {
            ("enqueue", [job_type, subject_id]) => Ok(Command::Enqueue {
                job_type: job_type.to_string(),
                subject_id: subject_id.to_string(),
                attachment_id: None,
            }),
            ("enqueue", [job_type, subject_id, attachment_id]) => Ok(Command::Enqueue {
                job_type: job_type.to_string(),
                subject_id: subject_id.to_string(),
                attachment_id: Some(attachment_id.to_string()),
            }),
            ("enqueue", _) => Err(CommandError::Usage("enqueue <type> <subjectId> [attachmentId]")),
            ("status", [id]) => Ok(Command::Status(JobId::from(*id))),
            ("status", _) => Err(CommandError::Usage("status <id>")),
            ("cancel", [id]) => Ok(Command::Cancel(JobId::from(*id))),
            ("cancel", _) => Err(CommandError::Usage("cancel <id>")),
            ("retry", [id]) => Ok(Command::Retry(JobId::from(*id))),
            ("retry", _) => Err(CommandError::Usage("retry <id>")),
            ("list", []) => Ok(Command::List(None)),
            ("list", [status]) => status
                .parse()
                .map(|s| Command::List(Some(s)))
                .map_err(|_| CommandError::InvalidStatus(status.to_string())),
            ("list", _) => Err(CommandError::Usage("list [status]")),
            ("help", _) => Ok(Command::Help),
            ("quit" | "exit", _) => Ok(Command::Quit),
            (other, _) => Err(CommandError::Unknown(other.to_string())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_enqueue_with_optional_attachment() {
        assert_eq!(
            Command::parse("enqueue ocr lesson-1"),
            Some(Ok(Command::Enqueue {
                job_type: "ocr".into(),
                subject_id: "lesson-1".into(),
                attachment_id: None,
            }))
        );
        assert_eq!(
            Command::parse("  enqueue tts lesson-2 att-9 "),
            Some(Ok(Command::Enqueue {
                job_type: "tts".into(),
                subject_id: "lesson-2".into(),
                attachment_id: Some("att-9".into()),
            }))
        );
        assert!(matches!(
            Command::parse("enqueue ocr"),
            Some(Err(CommandError::Usage(_)))
        ));
    }

    #[test]
    fn parses_id_commands() {
        assert_eq!(
            Command::parse("cancel 01HX"),
            Some(Ok(Command::Cancel(JobId::from("01HX"))))
        );
        assert_eq!(
            Command::parse("status abc"),
            Some(Ok(Command::Status(JobId::from("abc"))))
        );
        assert!(matches!(Command::parse("retry"), Some(Err(CommandError::Usage(_)))));
    }

    #[test]
    fn parses_list_filter() {
        assert_eq!(Command::parse("list"), Some(Ok(Command::List(None))));
        assert_eq!(
            Command::parse("list failed"),
            Some(Ok(Command::List(Some(JobStatus::Failed))))
        );
        assert_eq!(
            Command::parse("list done"),
            Some(Err(CommandError::InvalidStatus("done".into())))
        );
    }

    #[test]
    fn blank_and_unknown_lines() {
        assert_eq!(Command::parse("   "), None);
        assert_eq!(
            Command::parse("frobnicate"),
            Some(Err(CommandError::Unknown("frobnicate".into())))
        );
        assert_eq!(Command::parse("quit"), Some(Ok(Command::Quit)));
    }
}
