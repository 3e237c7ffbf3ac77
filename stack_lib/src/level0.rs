use std::collections::HashMap;

use crate::error::{Result, StackError};

/// Core level0 functionality handed to every construct module's `config` function:
/// - reporting configuration errors and warnings
/// - saving module outputs so that modules configured later can reference them
///
/// Errors are collected rather than returned so that a single run reports
/// every problem across all modules. Call [`L0Core::finish`] once all modules
/// have been configured.
#[derive(Debug, Default)]
pub struct L0Core {
    config_errors: Vec<String>,
    config_warnings: Vec<String>,
    module_outputs: HashMap<String, HashMap<String, String>>,
    current_module_name: String,
    users_module_name: String,
}

impl L0Core {
    /// `users_module_name` is the name of the top level stack definition.
    /// modules use it as a prefix/suffix when generating logical ids.
    pub fn new(users_module_name: &str) -> Self {
        Self {
            users_module_name: users_module_name.to_string(),
            ..Default::default()
        }
    }

    pub fn users_module_name(&self) -> String {
        self.users_module_name.clone()
    }

    /// set by the caller before invoking a module's `config` function, so that
    /// `set_output` files the value under that module.
    pub fn set_current_module(&mut self, name: &str) {
        self.current_module_name = name.to_string();
    }

    pub fn current_module_name(&self) -> &str {
        &self.current_module_name
    }

    /// set an output from your module. The key should correspond to
    /// the name of one of the constants in your `mod outputs { }` section.
    /// case matters.
    pub fn set_output(&mut self, key: &str, val: &str) {
        self.module_outputs
            .entry(self.current_module_name.clone())
            .or_default()
            .insert(key.to_string(), val.to_string());
    }

    pub fn get_output(&self, module_name: &str, key: &str) -> Option<&str> {
        self.module_outputs
            .get(module_name)
            .and_then(|outputs| outputs.get(key))
            .map(|s| s.as_str())
    }

    pub fn config_error(&mut self, err: &str) {
        let msg = if self.current_module_name.is_empty() {
            err.to_string()
        } else {
            format!("[{}] {err}", self.current_module_name)
        };
        tracing::debug!("{msg}");
        self.config_errors.push(msg);
    }

    pub fn config_warning(&mut self, msg: &str) {
        tracing::warn!(module = %self.current_module_name, "{msg}");
        self.config_warnings.push(msg.to_string());
    }

    pub fn has_errors(&self) -> bool {
        !self.config_errors.is_empty()
    }

    pub fn errors(&self) -> &[String] {
        &self.config_errors
    }

    pub fn warnings(&self) -> &[String] {
        &self.config_warnings
    }

    /// returns every collected error at once, or Ok if no module complained.
    pub fn finish(&mut self) -> Result<()> {
        if self.config_errors.is_empty() {
            return Ok(());
        }
        Err(StackError::Config(std::mem::take(&mut self.config_errors)))
    }
}
