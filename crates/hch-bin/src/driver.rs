//! The CLI driver: a `hch_scheduler::Driver` that prints a context's
//! rendering to stdout, reads one line from stdin, and loops on a parse
//! failure rather than ever handing a bad action back to the scheduler.

use crate::action_parser;
use hch_actions::Action;
use hch_context::Context;
use hch_datastore::Datastore;
use hch_hypertext::Hypertext;
use hch_scheduler::Driver;
use std::io::{self, Write};

/// Reads actions from stdin, prints renderings to stdout. Tracks whether
/// stdin has hit EOF so the binary's main loop knows to stop driving new
/// prompts and persist instead of looping forever on a closed pipe.
pub struct CliDriver {
    eof: bool,
}

impl CliDriver {
    pub fn new() -> Self {
        Self { eof: false }
    }

    pub fn hit_eof(&self) -> bool {
        self.eof
    }
}

impl Default for CliDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for CliDriver {
    fn prompt(&mut self, store: &mut Datastore<Hypertext>, context: &Context, rendering: &str) -> Option<Action> {
        loop {
            println!("{rendering}");
            print!("> ");
            let _ = io::stdout().flush();

            let mut line = String::new();
            match io::stdin().read_line(&mut line) {
                Ok(0) => {
                    self.eof = true;
                    return None;
                }
                Ok(_) => {}
                Err(err) => {
                    eprintln!("error: reading stdin: {err}");
                    self.eof = true;
                    return None;
                }
            }

            match action_parser::parse(store, context, &line) {
                Ok(action) => return Some(action),
                Err(err) => eprintln!("error: {err}"),
            }
        }
    }
}
