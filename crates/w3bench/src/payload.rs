use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};

const KEY_LEN: usize = 10;
const VALUE_LEN: usize = 50;
/// Two quotes around each of key and value, a colon and a comma.
const ENTRY_OVERHEAD: usize = 6;

fn random_string<R: Rng>(rng: &mut R, len: usize) -> String {
    rng.sample_iter(&Alphanumeric).take(len).map(char::from).collect()
}

/// A JSON object of random alphanumeric entries whose compact encoding is
/// at least `size_kb` KB, rendered with 4-space indentation.
pub fn random_json<R: Rng>(rng: &mut R, size_kb: u32) -> String {
    let target = size_kb as usize * 1024;
    let mut object = Map::new();
    // "{}"
    let mut encoded = 2;
    while encoded < target {
        let key = random_string(rng, KEY_LEN);
        if object.insert(key, Value::String(random_string(rng, VALUE_LEN))).is_none() {
            // the first entry has no separating comma
            encoded += KEY_LEN + VALUE_LEN + ENTRY_OVERHEAD - usize::from(object.len() == 1);
        }
    }

    let mut out = Vec::with_capacity(encoded * 2);
    let formatter = PrettyFormatter::with_indent(b"    ");
    let written = Value::Object(object).serialize(&mut serde_json::Serializer::with_formatter(&mut out, formatter));
    match written {
        Ok(()) => String::from_utf8(out).unwrap_or_default(),
        Err(_) => String::from("{}"),
    }
}
