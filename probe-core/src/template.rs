//! `{{var}}` substitution for setup hooks.
//!
//! Variables provided by the profiling session: `container_id`,
//! `session_id`, `output_file`, `timestamp`, plus any user variables from the
//! scenario. Unknown placeholders are left in place so a typo is visible in
//! the command that fails.

use std::collections::BTreeMap;

/// Replace every `{{ name }}` in `template` with `vars[name]`.
pub fn render(template: &str, vars: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let name = after[..end].trim();
                match vars.get(name) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&rest[start..start + 2 + end + 2]),
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> BTreeMap<String, String> {
        let mut v = BTreeMap::new();
        v.insert("container_id".to_string(), "netconf-ui".to_string());
        v.insert("session_id".to_string(), "s1".to_string());
        v
    }

    #[test]
    fn substitutes_known_variables() {
        assert_eq!(
            render("cp /etc/a /tmp/{{session_id}}/{{ container_id }}.bak", &vars()),
            "cp /etc/a /tmp/s1/netconf-ui.bak"
        );
    }

    #[test]
    fn unknown_and_unterminated_placeholders_stay() {
        assert_eq!(render("echo {{nope}} {{session_id}}", &vars()), "echo {{nope}} s1");
        assert_eq!(render("echo {{session_id", &vars()), "echo {{session_id");
        assert_eq!(render("no placeholders", &vars()), "no placeholders");
    }
}
