//! Operator commands typed at the kiosk terminal.

use anyhow::{anyhow, Result};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc::Sender;

use crate::form::FormField;
use crate::session::Event;

pub const HELP: &str = "commands: scan | upload <path> | nim|name|lab|pc <value> | submit | cancel | help | quit";

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<Event>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let field =
        |field: FormField| -> Result<Option<Event>> { Ok(Some(Event::Edit(field, rest.to_string()))) };
    match word.to_ascii_lowercase().as_str() {
        "scan" | "s" => Ok(Some(Event::ToggleScanning)),
        "upload" | "u" => {
            if rest.is_empty() {
                return Err(anyhow!("upload needs a file path"));
            }
            Ok(Some(Event::ManualUpload(PathBuf::from(rest))))
        }
        "nim" => field(FormField::Nim),
        "name" => field(FormField::Name),
        "lab" => field(FormField::Lab),
        "pc" => field(FormField::ComputerNo),
        "submit" => Ok(Some(Event::Submit)),
        "cancel" => Ok(Some(Event::Cancel)),
        "quit" | "exit" | "q" => Ok(Some(Event::Shutdown)),
        "help" | "?" => Err(anyhow!(HELP)),
        other => Err(anyhow!("unknown command '{}'; {}", other, HELP)),
    }
}

/// Forward parsed commands from `reader` until EOF or `quit`.
///
/// EOF sends `Event::Shutdown` so the session tears down cleanly.
pub fn forward_commands<R: BufRead>(reader: R, events: &Sender<Event>) -> Result<()> {
    for line in reader.lines() {
        let line = line.map_err(|e| anyhow!("read operator input: {}", e))?;
        match parse_command(&line) {
            Ok(Some(event)) => {
                let quit = matches!(event, Event::Shutdown);
                if events.send(event).is_err() || quit {
                    return Ok(());
                }
            }
            Ok(None) => {}
            Err(err) => eprintln!("{err}"),
        }
    }
    let _ = events.send(Event::Shutdown);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn parses_form_edits_with_spaces() -> Result<()> {
        let event = parse_command("name  Alice Wonder ")?;
        assert!(matches!(
            event,
            Some(Event::Edit(FormField::Name, ref v)) if v == "Alice Wonder"
        ));
        Ok(())
    }

    #[test]
    fn parses_upload_path() -> Result<()> {
        let event = parse_command("upload /tmp/card photo.jpg")?;
        assert!(matches!(
            event,
            Some(Event::ManualUpload(ref p)) if p == &PathBuf::from("/tmp/card photo.jpg")
        ));
        assert!(parse_command("upload").is_err());
        Ok(())
    }

    #[test]
    fn blank_and_unknown_lines() {
        assert!(matches!(parse_command("   "), Ok(None)));
        assert!(parse_command("dance").is_err());
        assert!(matches!(parse_command("SCAN"), Ok(Some(Event::ToggleScanning))));
    }

    #[test]
    fn eof_requests_shutdown() -> Result<()> {
        let (tx, rx) = mpsc::channel();
        forward_commands(std::io::Cursor::new("scan\nbogus\n\nsubmit\n"), &tx)?;

        let events: Vec<Event> = rx.try_iter().collect();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], Event::ToggleScanning));
        assert!(matches!(events[1], Event::Submit));
        assert!(matches!(events[2], Event::Shutdown));
        Ok(())
    }

    #[test]
    fn quit_stops_forwarding() -> Result<()> {
        let (tx, rx) = mpsc::channel();
        forward_commands(std::io::Cursor::new("quit\nscan\n"), &tx)?;

        let events: Vec<Event> = rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Event::Shutdown));
        Ok(())
    }
}
