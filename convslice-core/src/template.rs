use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([^{}]*)\}").expect("token regex"));
static PADDED_SEQUENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^n:0(\d{1,2})$").expect("padded sequence regex"));

/// Values available to a filename template.
#[derive(Debug, Clone)]
pub struct TemplateContext<'a> {
    pub date: &'a str,
    pub time: &'a str,
    pub id: &'a str,
    pub slice: &'a str,
    pub slug: &'a str,
    pub sequence: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedName {
    pub file_name: String,
    /// Tokens left verbatim because nothing is known by that name
    pub unknown_tokens: Vec<String>,
}

/// Substitute `{date}`, `{time}`, `{id}`, `{slice}`, `{slug}`, `{n}` and
/// `{n:0W}` in `template`.
pub fn render_filename(template: &str, ctx: &TemplateContext<'_>) -> RenderedName {
    let mut unknown_tokens = Vec::new();
    let file_name = TOKEN_RE
        .replace_all(template, |caps: &Captures<'_>| {
            let token = &caps[1];
            match token {
                "date" => sanitize(ctx.date),
                "time" => sanitize(ctx.time),
                "id" => sanitize(ctx.id),
                "slice" => sanitize(ctx.slice),
                "slug" => sanitize(ctx.slug),
                "n" => ctx.sequence.to_string(),
                _ => match PADDED_SEQUENCE_RE.captures(token) {
                    Some(width) => {
                        let width: usize = width[1].parse().unwrap_or(0);
                        format!("{:0width$}", ctx.sequence)
                    }
                    None => {
                        if !unknown_tokens.iter().any(|t| t == token) {
                            unknown_tokens.push(token.to_string());
                        }
                        caps[0].to_string()
                    }
                },
            }
        })
        .into_owned();

    RenderedName {
        file_name,
        unknown_tokens,
    }
}

/// Values are spliced into a single path component.
fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '-',
            other => other,
        })
        .collect()
}
