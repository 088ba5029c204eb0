use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Citation tag prefix and the route its id is appended to.
const LINK_ROUTES: [(&str, &str); 4] = [
    ("Note", "/notes?highlight="),
    ("Claim", "/claims?highlight="),
    ("Expense", "/expenses?highlight="),
    ("Payment", "/payments?highlight="),
];

struct LinkRule {
    pattern: Regex,
    route: &'static str,
}

static LINK_RULES: Lazy<Vec<LinkRule>> = Lazy::new(|| {
    LINK_ROUTES
        .iter()
        .map(|&(tag, route)| LinkRule {
            pattern: Regex::new(&format!(r"\[{}:\s*([^\]\s][^\]]*)\]\(ID:\s*([^)\s]+)\)", tag))
                .expect("citation pattern is valid"),
            route,
        })
        .collect()
});

/// Rewrites `[Note: label](ID:x)` style citations into app links,
/// e.g. `[label](/notes?highlight=x)`. Each rule runs once, in table order;
/// anything else passes through untouched.
pub fn linkify(text: &str) -> String {
    LINK_RULES.iter().fold(text.to_string(), |acc, rule| {
        rule.pattern
            .replace_all(&acc, |caps: &Captures| {
                format!("[{}]({}{})", caps[1].trim(), rule.route, &caps[2])
            })
            .into_owned()
    })
}
