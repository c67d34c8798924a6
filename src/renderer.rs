use crate::model::{Conversation, Format, Message, Role};
use serde::Serialize;
use std::io::{self, Write};

const TOOL_NAME: &str = env!("CARGO_PKG_NAME");

/// Per-run rendering knobs. `exported_at` is passed in so output is
/// reproducible.
pub struct RenderOptions<'a> {
    pub frontmatter: bool,
    pub tags: Option<&'a [String]>,
    pub exported_at: &'a str,
}

#[derive(Serialize)]
struct Frontmatter<'a> {
    title: &'a str,
    id: &'a str,
    source: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    created: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    tags: Option<&'a [String]>,
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() { None } else { Some(s) }
}

/// Escape text that lands inside a single Markdown line (headings, list
/// items). Line breaks collapse to spaces.
pub fn escape_inline(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut out = String::with_capacity(flat.len());
    for c in flat.chars() {
        if matches!(
            c,
            '\\' | '`' | '*' | '_' | '[' | ']' | '<' | '>' | '#' | '|' | '~'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Wrap `text` in a code span whose fence cannot be closed by the content.
pub fn code_span(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.is_empty() {
        return "(none)".to_string();
    }
    let mut longest = 0;
    let mut run = 0;
    for c in flat.chars() {
        if c == '`' {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    let fence = "`".repeat(longest + 1);
    if flat.starts_with('`') || flat.ends_with('`') {
        format!("{fence} {flat} {fence}")
    } else {
        format!("{fence}{flat}{fence}")
    }
}

/// The line with up to three spaces of indentation removed, or `None` when it
/// is indented far enough to be a code block.
fn block_start(line: &str) -> Option<&str> {
    let indent = line.len() - line.trim_start_matches(' ').len();
    if indent > 3 { None } else { Some(&line[indent..]) }
}

/// Opening fence of a fenced code block: (fence char, run length, rest of line).
fn fence_of(line: &str) -> Option<(char, usize, &str)> {
    let trimmed = block_start(line)?;
    let ch = trimmed.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let len = trimmed.chars().take_while(|c| *c == ch).count();
    if len < 3 {
        return None;
    }
    Some((ch, len, &trimmed[len..]))
}

const RAW_HTML_TAGS: [(&str, &str); 4] = [
    ("script", "</script>"),
    ("pre", "</pre>"),
    ("style", "</style>"),
    ("textarea", "</textarea>"),
];

/// HTML blocks that run until an explicit closer rather than a blank line.
/// Returns the closer that ends the block opened by `line`.
fn html_block_of(line: &str) -> Option<&'static str> {
    let trimmed = block_start(line)?;
    let rest = trimmed.strip_prefix('<')?;
    if rest.starts_with("!--") {
        return Some("-->");
    }
    if rest.starts_with("![CDATA[") {
        return Some("]]>");
    }
    if rest.starts_with('?') {
        return Some("?>");
    }
    if rest
        .strip_prefix('!')
        .and_then(|r| r.chars().next())
        .is_some_and(|c| c.is_ascii_alphabetic())
    {
        return Some(">");
    }
    RAW_HTML_TAGS.iter().find_map(|(tag, closer)| {
        let name = rest.get(..tag.len())?;
        let after = rest[tag.len()..].chars().next();
        (name.eq_ignore_ascii_case(tag) && matches!(after, None | Some(' ' | '\t' | '>')))
            .then_some(*closer)
    })
}

/// Any raw-text end tag closes a raw-text block, whichever tag opened it.
fn html_block_closed(closer: &str, line: &str) -> bool {
    if closer.starts_with("</") {
        let lower = line.to_ascii_lowercase();
        RAW_HTML_TAGS.iter().any(|(_, end)| lower.contains(end))
    } else {
        line.contains(closer)
    }
}

#[derive(Clone, Copy)]
enum OpenBlock {
    Fence(char, usize),
    Html(&'static str),
}

/// Prepare free-form message text for embedding as a block: normalize line
/// endings, drop trailing whitespace and close a code fence, HTML comment or
/// raw HTML block the text left open, so the rest of the document is not
/// swallowed into it.
pub fn normalize_block(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = text.trim_end().to_string();

    let mut open: Option<OpenBlock> = None;
    for line in out.lines() {
        match open {
            None => {
                if let Some((ch, len, rest)) = fence_of(line) {
                    if ch == '`' && rest.contains('`') {
                        continue;
                    }
                    open = Some(OpenBlock::Fence(ch, len));
                } else if let Some(closer) = html_block_of(line)
                    && !html_block_closed(closer, line)
                {
                    open = Some(OpenBlock::Html(closer));
                }
            }
            Some(OpenBlock::Fence(open_ch, open_len)) => {
                if let Some((ch, len, rest)) = fence_of(line)
                    && ch == open_ch
                    && len >= open_len
                    && rest.trim().is_empty()
                {
                    open = None;
                }
            }
            Some(OpenBlock::Html(closer)) => {
                if html_block_closed(closer, line) {
                    open = None;
                }
            }
        }
    }

    match open {
        Some(OpenBlock::Fence(ch, len)) => {
            out.push('\n');
            out.extend(std::iter::repeat_n(ch, len));
        }
        Some(OpenBlock::Html(closer)) => {
            out.push('\n');
            out.push_str(closer);
        }
        None => {}
    }
    out
}

/// Render text as a blockquote, one `>` per line, so it reads apart from the
/// surrounding answer.
pub fn blockquote(text: &str) -> String {
    normalize_block(text)
        .lines()
        .map(|line| {
            if line.is_empty() {
                ">".to_string()
            } else {
                format!("> {}", line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn role_label(role: &Role, source: Format) -> String {
    match role {
        Role::Assistant => source.display_name().to_string(),
        other => other.to_string(),
    }
}

fn write_frontmatter<W: Write>(
    writer: &mut W,
    conv: &Conversation,
    tags: Option<&[String]>,
) -> io::Result<()> {
    let fm = Frontmatter {
        title: conv.display_title(),
        id: &conv.id,
        source: conv.source.display_name(),
        created: non_empty(&conv.created_at),
        updated: non_empty(&conv.updated_at),
        model: conv.primary_model(),
        messages: conv.messages.len(),
        tags,
    };
    let yaml = serde_yaml::to_string(&fm).map_err(io::Error::other)?;
    writeln!(writer, "---")?;
    write!(writer, "{}", yaml)?;
    writeln!(writer, "---")?;
    writeln!(writer)?;
    Ok(())
}

fn write_message<W: Write>(
    writer: &mut W,
    index: usize,
    msg: &Message,
    source: Format,
) -> io::Result<()> {
    writeln!(
        writer,
        "## {}. {}",
        index,
        escape_inline(&role_label(&msg.role, source))
    )?;
    writeln!(writer)?;

    if let Some(ts) = &msg.timestamp {
        writeln!(writer, "*{}*", escape_inline(ts))?;
        writeln!(writer)?;
    }

    if let Some(model) = &msg.model {
        writeln!(writer, "**Model**: {}", code_span(model))?;
        writeln!(writer)?;
    }

    if !msg.attachments.is_empty() {
        let names: Vec<String> = msg
            .attachments
            .iter()
            .flatten()
            .map(|n| escape_inline(n))
            .collect();
        if names.is_empty() {
            writeln!(writer, "**Attachments**: {}", msg.attachments.len())?;
        } else {
            writeln!(
                writer,
                "**Attachments**: {} ({})",
                msg.attachments.len(),
                names.join(", ")
            )?;
        }
        writeln!(writer)?;
    }

    match &msg.thinking {
        Some(thinking) => {
            writeln!(writer, "### Thinking")?;
            writeln!(writer)?;
            writeln!(writer, "{}", blockquote(thinking))?;
            writeln!(writer)?;
            if !msg.content.trim().is_empty() {
                writeln!(writer, "### Response")?;
                writeln!(writer)?;
                writeln!(writer, "{}", normalize_block(&msg.content))?;
                writeln!(writer)?;
            }
        }
        None => {
            writeln!(writer, "{}", normalize_block(&msg.content))?;
            writeln!(writer)?;
        }
    }

    writeln!(writer, "---")?;
    writeln!(writer)?;
    Ok(())
}

pub fn render_conversation<W: Write>(
    writer: &mut W,
    conv: &Conversation,
    opts: &RenderOptions<'_>,
) -> io::Result<()> {
    if opts.frontmatter {
        write_frontmatter(writer, conv, opts.tags)?;
    }

    writeln!(writer, "# {}", escape_inline(conv.display_title()))?;
    writeln!(writer)?;
    writeln!(writer, "## Conversation info")?;
    writeln!(writer)?;
    writeln!(writer, "- **ID**: {}", code_span(&conv.id))?;
    if !conv.created_at.is_empty() {
        writeln!(writer, "- **Created**: {}", escape_inline(&conv.created_at))?;
    }
    if !conv.updated_at.is_empty() {
        writeln!(writer, "- **Updated**: {}", escape_inline(&conv.updated_at))?;
    }
    writeln!(writer, "- **Messages**: {}", conv.messages.len())?;
    if let Some(chains) = conv.chain_count {
        writeln!(writer, "- **Chains**: {}", chains)?;
    }
    writeln!(writer)?;
    writeln!(writer, "---")?;
    writeln!(writer)?;

    if conv.messages.is_empty() {
        writeln!(writer, "*No messages.*")?;
        writeln!(writer)?;
        writeln!(writer, "---")?;
        writeln!(writer)?;
    }

    for (i, msg) in conv.messages.iter().enumerate() {
        write_message(writer, i + 1, msg, conv.source)?;
    }

    writeln!(writer, "*Exported at: {}*", escape_inline(opts.exported_at))?;
    writeln!(writer)?;
    writeln!(
        writer,
        "*Generated by {} from a {} export*",
        escape_inline(TOOL_NAME),
        conv.source.display_name()
    )?;

    Ok(())
}
