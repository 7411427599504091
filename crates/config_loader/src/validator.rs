//! 配置校验模块
//!
//! 校验规则：
//! - schema 非空，frame_total_length > 0
//! - 字段名唯一，offset + length <= frame_total_length
//! - length 等于编码宽度
//! - 至多一个同步字段 (无符号整数，宽度 <= 4)，至多一个校验和字段
//! - scale_factor 有限且非零
//! - handler 名称非空且唯一，queue_capacity > 0
//! - max_consecutive_failures >= 1

use std::collections::HashSet;

use contracts::{ContractError, FrameSchema, PipelineSettings, TelemetryBlueprint};

/// 校验 TelemetryBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &TelemetryBlueprint) -> Result<(), ContractError> {
    validate_schema(&blueprint.schema)?;
    validate_pipeline(&blueprint.pipeline)?;
    validate_handlers(blueprint)?;
    Ok(())
}

/// 校验帧 schema (编解码器的前置条件)
pub fn validate_schema(schema: &FrameSchema) -> Result<(), ContractError> {
    validate_layout(schema)?;
    validate_field_names(schema)?;
    validate_field_bounds(schema)?;
    validate_role_fields(schema)?;
    validate_scale_factors(schema)?;
    Ok(())
}

/// 校验帧总体布局
fn validate_layout(schema: &FrameSchema) -> Result<(), ContractError> {
    if schema.fields.is_empty() {
        return Err(ContractError::config_validation(
            "parameters",
            "schema must declare at least one field",
        ));
    }
    if schema.total_length == 0 {
        return Err(ContractError::config_validation(
            "frame_total_length",
            "frame_total_length must be > 0",
        ));
    }
    Ok(())
}

/// 校验字段名唯一性
fn validate_field_names(schema: &FrameSchema) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, field) in schema.fields.iter().enumerate() {
        if field.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("parameters[{idx}].name"),
                "field name cannot be empty",
            ));
        }
        if !seen.insert(field.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("parameters[name={}]", field.name),
                "duplicate field name",
            ));
        }
    }
    Ok(())
}

/// 校验字段范围与宽度
fn validate_field_bounds(schema: &FrameSchema) -> Result<(), ContractError> {
    for field in &schema.fields {
        if field.length != field.binary_encoding.width() {
            return Err(ContractError::config_validation(
                format!("parameters[{}].length", field.name),
                format!(
                    "length {} does not match {} width {}",
                    field.length,
                    field.binary_encoding,
                    field.binary_encoding.width()
                ),
            ));
        }
        if field.end().map_or(true, |end| end > schema.total_length) {
            return Err(ContractError::config_validation(
                format!("parameters[{}].offset", field.name),
                format!(
                    "offset {} + length {} exceeds frame_total_length {}",
                    field.offset, field.length, schema.total_length
                ),
            ));
        }
    }
    Ok(())
}

/// 校验同步字/校验和字段
fn validate_role_fields(schema: &FrameSchema) -> Result<(), ContractError> {
    let sync_fields: Vec<_> = schema.fields.iter().filter(|f| f.is_sync_word).collect();
    match sync_fields.as_slice() {
        [] => {}
        [sync] => {
            let encoding = sync.binary_encoding;
            if !encoding.is_unsigned() || encoding.width() > 4 {
                return Err(ContractError::config_validation(
                    format!("parameters[{}].binary_encoding", sync.name),
                    format!("sync field must be an unsigned integer of at most 4 bytes, got {encoding}"),
                ));
            }
            let max = encoding.integer_range().map_or(0, |(_, max)| max);
            if i128::from(schema.sync_word) > max {
                return Err(ContractError::config_validation(
                    "frame_sync_word",
                    format!(
                        "sync word {:#X} does not fit {encoding}",
                        schema.sync_word
                    ),
                ));
            }
        }
        _ => {
            return Err(ContractError::config_validation(
                "parameters",
                format!("at most one sync field allowed, found {}", sync_fields.len()),
            ))
        }
    }

    let checksum_count = schema.fields.iter().filter(|f| f.is_checksum).count();
    if checksum_count > 1 {
        return Err(ContractError::config_validation(
            "parameters",
            format!("at most one checksum field allowed, found {checksum_count}"),
        ));
    }
    if let Some(field) = schema.fields.iter().find(|f| f.is_sync_word && f.is_checksum) {
        return Err(ContractError::config_validation(
            format!("parameters[{}]", field.name),
            "field cannot be both sync word and checksum",
        ));
    }
    Ok(())
}

/// 校验缩放系数
fn validate_scale_factors(schema: &FrameSchema) -> Result<(), ContractError> {
    for field in &schema.fields {
        if !field.scale_factor.is_finite() || field.scale_factor == 0.0 {
            return Err(ContractError::config_validation(
                format!("parameters[{}].scale_factor", field.name),
                format!("scale_factor must be finite and non-zero, got {}", field.scale_factor),
            ));
        }
    }
    Ok(())
}

/// 校验管线参数
fn validate_pipeline(pipeline: &PipelineSettings) -> Result<(), ContractError> {
    if pipeline.retry.max_consecutive_failures == 0 {
        return Err(ContractError::config_validation(
            "pipeline.retry.max_consecutive_failures",
            "max_consecutive_failures must be >= 1",
        ));
    }
    if pipeline.source_timestamp_field.is_empty() {
        return Err(ContractError::config_validation(
            "pipeline.source_timestamp_field",
            "source_timestamp_field cannot be empty",
        ));
    }
    Ok(())
}

/// 校验 handler 配置
fn validate_handlers(blueprint: &TelemetryBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, handler) in blueprint.handlers.iter().enumerate() {
        if handler.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("handlers[{idx}].name"),
                "handler name cannot be empty",
            ));
        }
        if !seen.insert(handler.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("handlers[name={}]", handler.name),
                "duplicate handler name",
            ));
        }
        if handler.queue_capacity == 0 {
            return Err(ContractError::config_validation(
                format!("handlers[{}].queue_capacity", handler.name),
                "queue_capacity must be > 0",
            ));
        }
    }
    Ok(())
}
