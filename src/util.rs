use rand::{
    distributions::Alphanumeric,
    thread_rng, Rng,
};


const OBJECT_PREFIX: &str = "public";
const KEY_SUFFIX_LEN: usize = 6;
const KEY_SUFFIX_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";


pub fn generate_rand_id(length: usize) -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Bucket key of an uploaded photo: `public/<epoch-millis>_<suffix>.<extension>`.
pub fn object_key(epoch_millis: i64, extension: &str) -> String {
    let mut rng = thread_rng();
    let suffix: String = (0..KEY_SUFFIX_LEN)
        .map(|_| KEY_SUFFIX_CHARS[rng.gen_range(0..KEY_SUFFIX_CHARS.len())] as char)
        .collect();

    format!("{}/{}_{}.{}", OBJECT_PREFIX, epoch_millis, suffix, extension)
}

/// Escapes text placed inside HTML markup or attribute values.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());

    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }

    escaped
}
