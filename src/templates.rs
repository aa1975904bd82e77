//! Query builders for the domain, person and company strategies.

use std::sync::OnceLock;

use regex::Regex;

use crate::{Result, SearchError};

/// Suffixes appended to a company name to find pages about its people.
const COMPANY_PAGE_HINTS: &[&str] = &["contact", "about", "team", "staff", "employees"];

/// Mailbox prefixes that often forward to a named person.
const ROLE_MAILBOXES: &[&str] = &["office", "contact", "info"];

fn scheme_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^https?://").expect("scheme pattern is valid"))
}

/// Strips the scheme and trailing slashes from a domain or URL.
pub fn clean_domain(domain: &str) -> String {
    scheme_re()
        .replace(domain.trim(), "")
        .trim_end_matches('/')
        .to_string()
}

fn require(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SearchError::InvalidQuery(format!("{} must not be empty", what)));
    }
    Ok(())
}

/// `"d" OR "www.d" OR "https://d" OR "http://d"`.
pub fn domain_query(domain: &str) -> Result<String> {
    let domain = clean_domain(domain);
    require(&domain, "domain")?;
    Ok(format!(
        r#""{d}" OR "www.{d}" OR "https://{d}" OR "http://{d}""#,
        d = domain
    ))
}

/// Candidate addresses for a person at a domain.
///
/// The first and last words of `full_name` are used; middle names are
/// ignored.
pub fn email_variations(full_name: &str, domain: &str) -> Vec<String> {
    let parts: Vec<String> = full_name.split_whitespace().map(str::to_lowercase).collect();
    let (first, last) = match parts.as_slice() {
        [] => return Vec::new(),
        [only] => (only.as_str(), ""),
        [first, .., last] => (first.as_str(), last.as_str()),
    };
    let fi = initial(first);
    let li = initial(last);

    let mut locals: Vec<String> = Vec::new();
    if !last.is_empty() {
        locals.extend([
            first.to_string(),
            format!("{first}.{last}"),
            format!("{first}{last}"),
            format!("{fi}{last}"),
            format!("{fi}.{last}"),
            format!("{last}.{first}"),
            format!("{last}{first}"),
            format!("{first}_{last}"),
            format!("{last}_{first}"),
            format!("{first}-{last}"),
            format!("{last}-{first}"),
            last.to_string(),
            format!("{fi}{li}"),
            format!("{fi}.{li}"),
        ]);
    } else {
        locals.extend([first.to_string(), fi.clone()]);
    }

    let mut emails: Vec<String> = locals.iter().map(|l| format!("{l}@{domain}")).collect();
    if !last.is_empty() {
        emails.push(format!("{first}.{last}.{domain}@gmail.com"));
        emails.push(format!("{first}{last}.{domain}@gmail.com"));
    }
    emails.extend(
        ROLE_MAILBOXES
            .iter()
            .map(|role| format!("{role}+{first}@{domain}")),
    );
    emails
}

fn initial(name: &str) -> String {
    name.chars().next().map(String::from).unwrap_or_default()
}

/// Person at a domain, together with likely e-mail addresses.
pub fn person_query(full_name: &str, domain: &str) -> Result<String> {
    let full_name = full_name.trim();
    require(full_name, "name")?;
    let domain = clean_domain(domain);
    require(&domain, "domain")?;

    let emails = email_variations(full_name, &domain)
        .iter()
        .map(|e| format!(r#""{e}""#))
        .collect::<Vec<_>>()
        .join(" OR ");
    Ok(format!(r#""{full_name}" "@{domain}" ({emails})"#))
}

/// Pages about a company and its people.
pub fn company_name_query(company: &str) -> Result<String> {
    let name = company.trim();
    require(name, "company name")?;
    let hints = COMPANY_PAGE_HINTS
        .iter()
        .map(|hint| format!(r#""{name} {hint}""#))
        .collect::<Vec<_>>()
        .join(" OR ");
    Ok(format!(r#""{name}" ({hints})"#))
}

/// A company's official website.
pub fn company_website_query(company: &str) -> Result<String> {
    let name = company.trim();
    require(name, "company name")?;
    Ok(format!(r#""{name}" official website"#))
}

/// Pages that reveal the address format used at a domain, using a sample
/// person's name when there is one.
pub fn email_pattern_query(sample_name: &str, domain: &str) -> Result<String> {
    let domain = clean_domain(domain);
    require(&domain, "domain")?;

    let parts: Vec<String> = sample_name.split_whitespace().map(str::to_lowercase).collect();
    let (first, last) = match parts.as_slice() {
        [first, .., last] => (first, last),
        _ => return Ok(format!(r#""@{domain}" email"#)),
    };
    let (fi, li) = (initial(first), initial(last));

    Ok(format!(
        r#""@{domain}" AND ("email pattern" OR "email format" OR "{first}*{last}@{domain}" OR "{last}*{first}@{domain}" OR "{fi}*{last}@{domain}" OR "{li}*{first}@{domain}")"#
    ))
}
