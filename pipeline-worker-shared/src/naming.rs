//! Naming rules for topics, consumer groups and index aliases.

/// Output topic of an index base: `<tenant>.mdl.process.<base_type>`.
pub fn output_topic_name(tenant: &str, base_type: &str) -> String {
    format!("{}.mdl.process.{}", tenant, base_type)
}

/// One consumer group per pipeline.
pub fn consumer_group_id(tenant: &str, pipeline_id: &str) -> String {
    format!("{}.sdp.{}", tenant, pipeline_id)
}

pub fn transactional_id(pipeline_id: &str, input_topic: &str) -> String {
    format!("{}_{}", pipeline_id, input_topic)
}

/// Index alias written to for a base type.
pub fn index_alias(base_type: &str) -> String {
    format!("mdl-{}", base_type)
}
