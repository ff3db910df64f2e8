use std::sync::Arc;

use super::{path::Path, request::Request, response::Response};
use crate::errors::RvError;

/// Routes requests to the first registered path whose pattern matches.
#[derive(Debug, Clone, Default)]
pub struct LogicalBackend {
    pub paths: Vec<Arc<Path>>,
    pub help: String,
}

impl LogicalBackend {
    pub fn new(help: &str) -> Self {
        Self { paths: Vec::new(), help: help.trim().to_string() }
    }

    pub fn add_path(&mut self, path: Path) {
        self.paths.push(Arc::new(path));
    }

    pub fn match_path(&self, path: &str) -> Option<(Arc<Path>, std::collections::HashMap<String, String>)> {
        self.paths.iter().find_map(|p| p.captures(path).map(|params| (Arc::clone(p), params)))
    }

    pub fn handle_request(&self, req: &mut Request) -> Result<Option<Response>, RvError> {
        let (path, params) = self.match_path(&req.path).ok_or(RvError::ErrLogicalPathUnsupported)?;
        let handler = path.handler(req.operation).ok_or(RvError::ErrLogicalOperationUnsupported)?;

        req.params = params;
        log::debug!("handle {} {}", req.operation, req.path);

        let mut resp = handler(req)?;
        if let Some(r) = resp.as_mut() {
            r.set_request_id(&req.id);
        }

        Ok(resp)
    }
}
