//! Configuration validation.

use super::{BulkOptions, Config};
use crate::bulk::CharacterSet;
use crate::error::{BulkError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    if config.sql_server.is_none() && config.ms_access.is_none() {
        return Err(BulkError::Config(
            "at least one of sql_server or ms_access is required".into(),
        ));
    }

    if let Some(sql) = &config.sql_server {
        if sql.host.trim().is_empty() {
            return Err(BulkError::Config("sql_server.host is required".into()));
        }
        if sql.database.trim().is_empty() {
            return Err(BulkError::Config("sql_server.database is required".into()));
        }
        if sql.user.trim().is_empty() {
            return Err(BulkError::Config("sql_server.user is required".into()));
        }
        if let Some(instance) = &sql.instance {
            if instance.trim().is_empty() {
                return Err(BulkError::Config(
                    "sql_server.instance must not be empty when set".into(),
                ));
            }
        }
    }

    if let Some(access) = &config.ms_access {
        if access.database_path.as_os_str().is_empty() {
            return Err(BulkError::Config(
                "ms_access.database_path is required".into(),
            ));
        }
        if access.driver.trim().is_empty() {
            return Err(BulkError::Config("ms_access.driver is required".into()));
        }
    }

    validate_bulk(&config.bulk)
}

fn validate_bulk(bulk: &BulkOptions) -> Result<()> {
    if bulk.batch_size < 0 {
        return Err(BulkError::Config(format!(
            "bulk.batch_size must not be negative, got {}",
            bulk.batch_size
        )));
    }
    if bulk.bulk_insert_timeout_secs < 0 {
        return Err(BulkError::Config(format!(
            "bulk.bulk_insert_timeout_secs must not be negative, got {}",
            bulk.bulk_insert_timeout_secs
        )));
    }
    if bulk.delimiter == '"' || bulk.delimiter.is_whitespace() {
        return Err(BulkError::Config(format!(
            "bulk.delimiter cannot be {:?}",
            bulk.delimiter
        )));
    }
    if !CharacterSet::from_code_page(bulk.code_page).is_supported() {
        return Err(BulkError::Config(format!(
            "bulk.code_page {} has no known encoding",
            bulk.code_page
        )));
    }
    if let Some(template) = &bulk.temp_database_template {
        if template.as_os_str().is_empty() {
            return Err(BulkError::Config(
                "bulk.temp_database_template must not be empty when set".into(),
            ));
        }
    }
    Ok(())
}
