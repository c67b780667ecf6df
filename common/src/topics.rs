pub const TOPIC_ROOT: &str = "hvac_group";

pub const CMD_TARGET: &str = "target";
pub const CMD_MODE: &str = "mode";

/// Lowercase, `_`-separated form of a group name or entity id, safe to use
/// as a single MQTT topic level.
pub fn slug(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    for ch in value.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_matches('_').to_string()
}

pub fn group_state_topic(group: &str) -> String {
    format!("{TOPIC_ROOT}/{}/state", slug(group))
}

pub fn group_command_topic(group: &str, command: &str) -> String {
    format!("{TOPIC_ROOT}/{}/cmnd/{command}", slug(group))
}

pub fn member_command_topic(member_id: &str) -> String {
    format!("{TOPIC_ROOT}/member/{}/set", slug(member_id))
}

pub fn member_state_topic(member_id: &str) -> String {
    format!("{TOPIC_ROOT}/member/{}/state", slug(member_id))
}

pub fn source_state_topic(source_id: &str) -> String {
    format!("{TOPIC_ROOT}/source/{}/state", slug(source_id))
}
