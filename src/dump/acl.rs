// ABOUTME: Converts PostgreSQL aclitem text into GRANT statements
// ABOUTME: Handles PUBLIC grantees, quoted role names and grant options

use crate::utils::quote_ident;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclItem {
    /// `None` for PUBLIC
    pub grantee: Option<String>,
    pub privileges: Vec<&'static str>,
    pub grantable: Vec<&'static str>,
    pub grantor: String,
}

fn privilege_name(code: char) -> Option<&'static str> {
    Some(match code {
        'r' => "SELECT",
        'w' => "UPDATE",
        'a' => "INSERT",
        'd' => "DELETE",
        'D' => "TRUNCATE",
        'x' => "REFERENCES",
        't' => "TRIGGER",
        'X' => "EXECUTE",
        'U' => "USAGE",
        'C' => "CREATE",
        'c' => "CONNECT",
        'T' => "TEMPORARY",
        'm' => "MAINTAIN",
        's' => "SET",
        'A' => "ALTER SYSTEM",
        _ => return None,
    })
}

/// Split a role name that may be double-quoted, returning it unquoted
fn unquote_role(raw: &str) -> String {
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        raw[1..raw.len() - 1].replace("\"\"", "\"")
    } else {
        raw.to_string()
    }
}

/// Find the `=` separating grantee from privileges, skipping quoted names
fn find_separator(item: &str) -> Option<usize> {
    let mut in_quotes = false;
    for (i, c) in item.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '=' if !in_quotes => return Some(i),
            _ => {}
        }
    }
    None
}

/// Parse one `grantee=privs/grantor` item
pub fn parse_acl_item(item: &str) -> Option<AclItem> {
    let eq = find_separator(item)?;
    let grantee_raw = &item[..eq];
    let rest = &item[eq + 1..];
    let (privs, grantor) = rest.rsplit_once('/')?;

    let mut privileges = Vec::new();
    let mut grantable = Vec::new();
    let mut chars = privs.chars().peekable();
    while let Some(code) = chars.next() {
        let name = privilege_name(code)?;
        if chars.peek() == Some(&'*') {
            chars.next();
            grantable.push(name);
        } else {
            privileges.push(name);
        }
    }

    Some(AclItem {
        grantee: if grantee_raw.is_empty() {
            None
        } else {
            Some(unquote_role(grantee_raw))
        },
        privileges,
        grantable,
        grantor: unquote_role(grantor),
    })
}

/// Render `GRANT` statements for an object's ACL
///
/// `object` is the SQL after `ON`, e.g. `TABLE "public"."orders"`.
/// Unparseable items are returned as comments so nothing is silently lost.
pub fn grant_statements(acl: &[String], object: &str) -> Vec<String> {
    let mut statements = Vec::new();
    for raw in acl {
        let Some(item) = parse_acl_item(raw) else {
            statements.push(format!("-- unrecognised ACL entry on {}: {}", object, raw));
            continue;
        };
        let grantee = item
            .grantee
            .as_deref()
            .map(quote_ident)
            .unwrap_or_else(|| "PUBLIC".to_string());
        if !item.privileges.is_empty() {
            statements.push(format!(
                "GRANT {} ON {} TO {};",
                item.privileges.join(", "),
                object,
                grantee
            ));
        }
        if !item.grantable.is_empty() {
            statements.push(format!(
                "GRANT {} ON {} TO {} WITH GRANT OPTION;",
                item.grantable.join(", "),
                object,
                grantee
            ));
        }
    }
    statements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_acl_item() {
        let item = parse_acl_item("alice=arw*/postgres").unwrap();
        assert_eq!(item.grantee.as_deref(), Some("alice"));
        assert_eq!(item.privileges, vec!["INSERT", "SELECT"]);
        assert_eq!(item.grantable, vec!["UPDATE"]);
        assert_eq!(item.grantor, "postgres");

        let public = parse_acl_item("=X/owner").unwrap();
        assert_eq!(public.grantee, None);

        let quoted = parse_acl_item("\"report=ers\"=r/owner").unwrap();
        assert_eq!(quoted.grantee.as_deref(), Some("report=ers"));

        assert!(parse_acl_item("bob=Q/owner").is_none());
    }

    #[test]
    fn test_grant_statements() {
        let acl = vec!["=X/owner".to_string(), "app=r*w/owner".to_string()];
        let grants = grant_statements(&acl, "TABLE \"public\".\"orders\"");
        assert_eq!(
            grants,
            vec![
                "GRANT EXECUTE ON TABLE \"public\".\"orders\" TO PUBLIC;",
                "GRANT UPDATE ON TABLE \"public\".\"orders\" TO \"app\";",
                "GRANT SELECT ON TABLE \"public\".\"orders\" TO \"app\" WITH GRANT OPTION;",
            ]
        );
    }
}
