//! Schema helpers for fields passed through verbatim to core/v1 types

/// Open object schema for passthrough fields such as pod affinity
pub fn preserve_unknown_fields(_generator: &mut schemars::SchemaGenerator) -> schemars::Schema {
    schemars::json_schema!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true
    })
}
