//! Tag list parsing.
//!
//! SoundCloud stores tags as one string: tags are separated by spaces, and
//! tags that contain spaces are wrapped in double quotes:
//!
//! ```text
//! rock "hip hop" "drum & bass" electronic
//! ```

/// Splits a raw tag list into its tags, in order.
///
/// Empty tags (from repeated spaces or `""`) are dropped. An unterminated
/// quote runs to the end of the string.
#[must_use]
pub fn parse(tag_list: &str) -> Vec<String> {
    let mut tags = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for chr in tag_list.chars() {
        match chr {
            '"' => quoted = !quoted,
            ' ' if !quoted => push(&mut tags, &mut current),
            _ => current.push(chr),
        }
    }
    push(&mut tags, &mut current);

    tags
}

fn push(tags: &mut Vec<String>, current: &mut String) {
    if !current.is_empty() {
        tags.push(std::mem::take(current));
    }
}
