use std::{collections::HashMap, fmt, sync::Arc};

use regex::Regex;

use super::{Operation, Request, Response};
use crate::errors::RvError;

pub type PathOperationHandler = dyn Fn(&mut Request) -> Result<Option<Response>, RvError> + Send + Sync;

#[derive(Clone)]
pub struct PathOperation {
    pub op: Operation,
    pub handler: Arc<PathOperationHandler>,
}

/// A path pattern with the handlers serving it. Named capture groups of the pattern become
/// request params.
#[derive(Clone)]
pub struct Path {
    pub pattern: String,
    pub re: Regex,
    pub operations: Vec<PathOperation>,
    pub help: String,
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Path")
            .field("pattern", &self.pattern)
            .field("operations", &self.operations.iter().map(|o| o.op).collect::<Vec<_>>())
            .finish()
    }
}

impl Path {
    pub fn new(pattern: &str, help: &str) -> Result<Self, RvError> {
        let mut anchored = pattern.to_string();
        if !anchored.starts_with('^') {
            anchored = format!("^{anchored}");
        }
        if !anchored.ends_with('$') {
            anchored = format!("{anchored}$");
        }

        Ok(Self { pattern: pattern.to_string(), re: Regex::new(&anchored)?, operations: Vec::new(), help: help.trim().to_string() })
    }

    pub fn operation<F>(mut self, op: Operation, handler: F) -> Self
    where
        F: Fn(&mut Request) -> Result<Option<Response>, RvError> + Send + Sync + 'static,
    {
        self.operations.push(PathOperation { op, handler: Arc::new(handler) });
        self
    }

    pub fn captures(&self, path: &str) -> Option<HashMap<String, String>> {
        let caps = self.re.captures(path)?;
        let mut params = HashMap::new();
        for name in self.re.capture_names().flatten() {
            if let Some(value) = caps.name(name) {
                params.insert(name.to_string(), value.as_str().to_string());
            }
        }
        Some(params)
    }

    pub fn handler(&self, op: Operation) -> Option<Arc<PathOperationHandler>> {
        self.operations.iter().find(|o| o.op == op).map(|o| Arc::clone(&o.handler))
    }
}
