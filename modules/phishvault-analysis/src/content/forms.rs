use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use phishvault_common::extract_host;

static RE_FORM_ACTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"action\s*=\s*["'](https?://[^"']+)["']"#).expect("valid regex")
});

/// Structural risk read off the page's forms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormRisk {
    pub has_password: bool,
    pub has_upload: bool,
    /// A form posts to an absolute URL on a host other than the hosting domain.
    pub foreign_action: bool,
}

/// Substring-level form analysis over markup.
pub fn analyze_forms(markup: &str, hosting_domain: &str) -> FormRisk {
    let html = markup.to_lowercase();
    let domain = hosting_domain.trim().to_lowercase();

    let has_password = html.contains("type=\"password\"") || html.contains("type='password'");
    let has_upload = html.contains("type=\"file\"") || html.contains("type='file'");

    let foreign_action = RE_FORM_ACTION.captures_iter(&html).any(|cap| {
        !extract_host(&cap[1]).contains(&domain)
    });

    FormRisk {
        has_password,
        has_upload,
        foreign_action,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_password_and_upload_inputs() {
        let risk = analyze_forms(
            r#"<form><input TYPE="password"><input type='file'></form>"#,
            "example.com",
        );
        assert!(risk.has_password);
        assert!(risk.has_upload);
        assert!(!risk.foreign_action);
    }

    #[test]
    fn absolute_action_to_other_host_is_foreign() {
        let risk = analyze_forms(r#"<form action="http://evil.com/post.php">"#, "paypal.com");
        assert!(risk.foreign_action);
    }

    #[test]
    fn action_on_hosting_domain_is_not_foreign() {
        let risk = analyze_forms(
            r#"<form action="https://www.paypal.com/signin">"#,
            "www.paypal.com",
        );
        assert!(!risk.foreign_action);
    }

    #[test]
    fn relative_actions_are_ignored() {
        let risk = analyze_forms(r#"<form action="/login">"#, "paypal.com");
        assert!(!risk.foreign_action);
    }

    #[test]
    fn any_foreign_form_counts() {
        let markup = r#"
            <form action="https://shop.test/search"></form>
            <form action='https://drop.evil.test/collect'></form>
        "#;
        assert!(analyze_forms(markup, "shop.test").foreign_action);
    }

    #[test]
    fn domain_in_path_does_not_hide_foreign_host() {
        let risk = analyze_forms(
            r#"<form action="https://evil.test/paypal.com/post">"#,
            "paypal.com",
        );
        assert!(risk.foreign_action);
    }
}
