//! JSON-lines protocol between the host and a process-backed action.
//!
//! ```text
//! host  -> script   {"context": {...}, "data": {...}}          (first line)
//! script -> host    {"op": "store", "element": {...}}          (commands)
//! host  -> script   {"error": null, "result": {...}}          (replies)
//! script -> host    {"op": "done"}                            (completion)
//! ```
//!
//! Only query-style commands (`has_errors`, `data`, `store`, `fetch`,
//! `require`, `call`) get a reply line.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::Domain;
use crate::scripting::executor::ActionContext;
use crate::types::Document;

/// A command written by the script on stdout.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    Error {
        key: String,
        #[serde(default)]
        value: Option<Value>,
    },
    Hide {
        property: String,
    },
    Set {
        key: String,
        value: Value,
    },
    Merge {
        data: Document,
    },
    HasErrors,
    Data,
    Store {
        element: Document,
    },
    Fetch {
        #[serde(default)]
        query: Option<Value>,
    },
    Require {
        name: String,
    },
    Call {
        method: String,
        path: String,
        #[serde(default)]
        body: Option<Value>,
    },
    Done {
        #[serde(default)]
        error: Option<Value>,
    },
}

/// A reply line written to the script's stdin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    pub error: Option<String>,
    pub result: Value,
}

impl Reply {
    pub fn ok(result: Value) -> Self {
        Self {
            error: None,
            result,
        }
    }

    pub fn err(error: impl ToString) -> Self {
        Self {
            error: Some(error.to_string()),
            result: Value::Null,
        }
    }
}

/// What the host does after applying a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Continue,
    Reply(Reply),
    /// Script finished; `Some` carries its error message.
    Done(Option<String>),
}

/// The first line sent to the script.
pub fn init_line(context: &ActionContext, data: &Document) -> Value {
    json!({ "context": context, "data": data })
}

/// Apply `command` to `domain`.
pub async fn apply(command: Command, domain: &mut Domain) -> Step {
    match command {
        Command::Error { key, value } => {
            domain.error(key, value);
            Step::Continue
        }
        Command::Hide { property } => {
            domain.hide(&property);
            Step::Continue
        }
        Command::Set { key, value } => {
            domain.set(key, value);
            Step::Continue
        }
        Command::Merge { data } => {
            domain.merge(data);
            Step::Continue
        }
        Command::HasErrors => Step::Reply(Reply::ok(Value::Bool(domain.has_errors()))),
        Command::Data => Step::Reply(Reply::ok(Value::Object(domain.data().clone()))),
        Command::Store { element } => Step::Reply(match domain.store(element).await {
            Ok(stored) => Reply::ok(Value::Object(stored)),
            Err(e) => Reply::err(e),
        }),
        Command::Fetch { query } => Step::Reply(match domain.fetch(query).await {
            Ok(fetched) => Reply::ok(fetched.into_value()),
            Err(e) => Reply::err(e),
        }),
        Command::Require { name } => Step::Reply(match domain.require(&name) {
            Ok(path) => Reply::ok(Value::String(path.display().to_string())),
            Err(e) => Reply::err(e),
        }),
        Command::Call { method, path, body } => {
            Step::Reply(match domain.call(&method, &path, body).await {
                Ok(value) => Reply::ok(value),
                Err(e) => Reply::err(e),
            })
        }
        Command::Done { error } => Step::Done(error.map(|e| match e {
            Value::String(s) => s,
            other => other.to_string(),
        })),
    }
}
