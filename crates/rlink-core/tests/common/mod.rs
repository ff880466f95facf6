//! Scripted stand-in for an R process.
//!
//! Understands the command templates rlink writes and a handful of R
//! statements, and calls back into the transfer endpoint over HTTP the way
//! RCurl would. Tables are kept in their wire JSON.

#![allow(dead_code)]

use async_trait::async_trait;
use regex::Regex;
use rlink::{Interpreter, Result, RlinkError};
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

static TEMPLATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)tryCatch\(\{\n(.*)\n\}, warning = function\(w\) \{.*httpPUT\("([^"]+)", toJSON\(\.\.rlink\.ret"#,
    )
    .unwrap()
});
static FETCH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^([\w.]+) <- fromJSON\(getURL\("([^"]+)"\)\)$"#).unwrap());
static DELIVER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^invisible\(httpPUT\("([^"]+)", toJSON\(([\w.]+), digits = NA\)\)\)$"#).unwrap()
});
static FETCH_TABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)^\.\.rlink\.tbl <- fromJSON\(getURL\("([^"]+)"\), simplifyVector = FALSE\)\n([\w.]+) <- as\.data\.frame"#)
        .unwrap()
});
static DELIVER_TABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)^\.\.rlink\.tbl <- as\.data\.frame\(([\w.]+), stringsAsFactors = FALSE\)\ninvisible\(httpPUT\("([^"]+)""#)
        .unwrap()
});
static ADD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([\w.]+) = ([\w.]+) \+ (-?\d+(?:\.\d+)?)$").unwrap());
static WARNING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^warning\('([^']*)'\)$").unwrap());
static STOP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^stop\('([^']*)'\)$").unwrap());
static GRAPHICS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:plot|lines)\(([\w.]+), ([\w.]+)(?:, .*)?\)$").unwrap());

/// Fake interpreter fed through an in-process channel.
pub struct FakeR {
    input: Option<mpsc::UnboundedSender<String>>,
    task: Option<JoinHandle<()>>,
    commands: Arc<Mutex<Vec<String>>>,
}

impl FakeR {
    /// Start the fake. Must be called inside a tokio runtime.
    pub fn start() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let commands = Arc::new(Mutex::new(Vec::new()));
        let task = tokio::spawn(serve(rx, commands.clone()));
        Self {
            input: Some(tx),
            task: Some(task),
            commands,
        }
    }

    /// Command bodies seen so far, unwrapped from the template.
    pub fn commands(&self) -> Arc<Mutex<Vec<String>>> {
        self.commands.clone()
    }
}

#[async_trait]
impl Interpreter for FakeR {
    async fn write_input(&mut self, text: &str) -> Result<()> {
        let input = self.input.as_ref().ok_or_else(|| RlinkError::Transport {
            message: "fake R input is closed".into(),
        })?;
        input
            .send(text.to_string())
            .map_err(|_| RlinkError::Transport {
                message: "fake R has exited".into(),
            })
    }

    async fn close_input(&mut self) -> Result<()> {
        self.input = None;
        Ok(())
    }

    async fn wait(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            task.await
                .map_err(|e| RlinkError::Other(format!("fake R panicked: {}", e)))?;
        }
        Ok(())
    }
}

enum Outcome {
    Clean,
    Warning(String),
    Error(String),
    /// Reply with the old two-element array instead of the record.
    PairShape,
}

struct FakeState {
    vars: HashMap<String, JsonValue>,
    warn_is_error: bool,
    client: reqwest::Client,
}

async fn serve(mut rx: mpsc::UnboundedReceiver<String>, commands: Arc<Mutex<Vec<String>>>) {
    let mut state = FakeState {
        vars: HashMap::new(),
        warn_is_error: false,
        client: reqwest::Client::new(),
    };

    while let Some(text) = rx.recv().await {
        if text == "q()\n" {
            break;
        }
        let Some(caps) = TEMPLATE.captures(&text) else {
            // library() preamble and other raw input
            continue;
        };
        let body = caps[1].to_string();
        let result_url = caps[2].to_string();
        commands.lock().unwrap().push(body.clone());

        let record = match state.eval(&body).await {
            Outcome::Clean => json!({"Warning": "", "Error": ""}),
            Outcome::Warning(w) => json!({"Warning": w, "Error": ""}),
            Outcome::Error(e) => json!({"Warning": "", "Error": e}),
            Outcome::PairShape => json!(["", ""]),
        };
        state
            .client
            .put(&result_url)
            .body(record.to_string())
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .expect("result delivery failed");
    }
}

fn not_found(name: &str) -> Outcome {
    Outcome::Error(format!("object '{}' not found", name))
}

impl FakeState {
    async fn eval(&mut self, body: &str) -> Outcome {
        if let Some(caps) = FETCH_TABLE.captures(body) {
            return self.fetch(&caps[2], &caps[1]).await;
        }
        if let Some(caps) = DELIVER_TABLE.captures(body) {
            return self.deliver(&caps[1], &caps[2]).await;
        }
        if let Some(caps) = FETCH.captures(body) {
            return self.fetch(&caps[1], &caps[2]).await;
        }
        if let Some(caps) = DELIVER.captures(body) {
            return self.deliver(&caps[2], &caps[1]).await;
        }
        if let Some(caps) = ADD.captures(body) {
            return self.add(&caps[1], &caps[2], &caps[3]);
        }
        if let Some(caps) = WARNING.captures(body) {
            return if self.warn_is_error {
                Outcome::Error(format!("(converted from warning) {}", &caps[1]))
            } else {
                Outcome::Warning(caps[1].to_string())
            };
        }
        if let Some(caps) = STOP.captures(body) {
            return Outcome::Error(caps[1].to_string());
        }
        if let Some(caps) = GRAPHICS.captures(body) {
            for name in [&caps[1], &caps[2]] {
                if !self.vars.contains_key(name) {
                    return not_found(name);
                }
            }
            return Outcome::Clean;
        }
        match body {
            "options(warn = 2)" | "options(warn=2)" => {
                self.warn_is_error = true;
                Outcome::Clean
            }
            "invisible(NULL)" => Outcome::Clean,
            "emit_pair_result()" => Outcome::PairShape,
            other => Outcome::Error(format!("could not find function for {:?}", other)),
        }
    }

    async fn fetch(&mut self, name: &str, url: &str) -> Outcome {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => return Outcome::Error(e.to_string()),
        };
        if !response.status().is_success() {
            return Outcome::Error(format!("HTTP error {}", response.status()));
        }
        match response.json::<JsonValue>().await {
            Ok(value) => {
                self.vars.insert(name.to_string(), value);
                Outcome::Clean
            }
            Err(e) => Outcome::Error(e.to_string()),
        }
    }

    async fn deliver(&mut self, name: &str, url: &str) -> Outcome {
        let Some(value) = self.vars.get(name) else {
            return not_found(name);
        };
        let sent = self
            .client
            .put(url)
            .body(value.to_string())
            .timeout(Duration::from_secs(10))
            .send()
            .await;
        match sent {
            Ok(_) => Outcome::Clean,
            Err(e) => Outcome::Error(e.to_string()),
        }
    }

    fn add(&mut self, target: &str, source: &str, amount: &str) -> Outcome {
        let Some(value) = self.vars.get(source) else {
            return not_found(source);
        };
        let amount: f64 = amount.parse().unwrap();
        let bump = |v: &JsonValue| v.as_f64().map(|n| json!(n + amount));
        let result = match value {
            JsonValue::Array(items) => items.iter().map(bump).collect::<Option<Vec<_>>>().map(JsonValue::Array),
            other => bump(other),
        };
        match result {
            Some(result) => {
                self.vars.insert(target.to_string(), result);
                Outcome::Clean
            }
            None => Outcome::Error("non-numeric argument to binary operator".into()),
        }
    }
}
