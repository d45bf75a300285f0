use unicode_normalization::UnicodeNormalization;

/// Letter + spacing/combining mark sequences typed instead of the composed letter.
///
/// Canonical combining marks (e.g. `a` + U+0304) are already composed by NFC; this
/// table covers spacing look-alikes and the comma-below variants that NFC leaves
/// alone. All entries are lowercase because lookup happens after lowercasing.
const MARK_SHORTCUTS: &[(char, char, char)] = &[
    // spacing macron and modifier macron
    ('a', '\u{00AF}', 'ā'),
    ('e', '\u{00AF}', 'ē'),
    ('i', '\u{00AF}', 'ī'),
    ('o', '\u{00AF}', 'ō'),
    ('u', '\u{00AF}', 'ū'),
    ('a', '\u{02C9}', 'ā'),
    ('e', '\u{02C9}', 'ē'),
    ('i', '\u{02C9}', 'ī'),
    ('o', '\u{02C9}', 'ō'),
    ('u', '\u{02C9}', 'ū'),
    // modifier caron
    ('c', '\u{02C7}', 'č'),
    ('s', '\u{02C7}', 'š'),
    ('z', '\u{02C7}', 'ž'),
    // spacing cedilla
    ('g', '\u{00B8}', 'ģ'),
    ('k', '\u{00B8}', 'ķ'),
    ('l', '\u{00B8}', 'ļ'),
    ('n', '\u{00B8}', 'ņ'),
    ('r', '\u{00B8}', 'ŗ'),
    // combining comma below
    ('k', '\u{0326}', 'ķ'),
    ('l', '\u{0326}', 'ļ'),
    ('n', '\u{0326}', 'ņ'),
    ('r', '\u{0326}', 'ŗ'),
    // combining turned comma above
    ('g', '\u{0312}', 'ģ'),
];

/// Precomposed look-alike letters produced by foreign keyboard layouts.
const LOOKALIKES: &[(char, char)] = &[
    ('ǵ', 'ģ'),
    ('ğ', 'ģ'),
    ('ǧ', 'ģ'),
    ('ș', 'š'),
    ('ş', 'š'),
];

/// Composed diacritic letters of the exam language and their base letters.
const DIACRITIC_BASES: &[(char, char)] = &[
    ('ā', 'a'),
    ('č', 'c'),
    ('ē', 'e'),
    ('ģ', 'g'),
    ('ī', 'i'),
    ('ķ', 'k'),
    ('ļ', 'l'),
    ('ņ', 'n'),
    ('ō', 'o'),
    ('ŗ', 'r'),
    ('š', 's'),
    ('ū', 'u'),
    ('ž', 'z'),
    ('Ā', 'A'),
    ('Č', 'C'),
    ('Ē', 'E'),
    ('Ģ', 'G'),
    ('Ī', 'I'),
    ('Ķ', 'K'),
    ('Ļ', 'L'),
    ('Ņ', 'N'),
    ('Ō', 'O'),
    ('Ŗ', 'R'),
    ('Š', 'S'),
    ('Ū', 'U'),
    ('Ž', 'Z'),
];

/// Returns the base letter of a diacritic letter, if `c` is one.
#[must_use]
pub fn base_letter(c: char) -> Option<char> {
    DIACRITIC_BASES
        .iter()
        .find(|(composed, _)| *composed == c)
        .map(|(_, base)| *base)
}

/// Canonical comparison form of an anthem transcription.
///
/// NFC, lowercase, whitespace collapse, then alternate diacritic notations are
/// rewritten to the composed letters. `normalize(normalize(x)) == normalize(x)`.
#[must_use]
pub fn normalize(text: &str) -> String {
    let composed: String = text.nfc().collect();
    let lowered = composed.to_lowercase();
    let collapsed = collapse_whitespace(&lowered);
    canonicalize_diacritics(&collapsed)
}

fn collapse_whitespace(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");

    let lines: Vec<String> = unified
        .split('\n')
        .map(|line| {
            let mut out = String::with_capacity(line.len());
            let mut in_run = false;
            for c in line.chars() {
                if c.is_whitespace() {
                    in_run = true;
                    continue;
                }
                if in_run && !out.is_empty() {
                    out.push(' ');
                }
                in_run = false;
                out.push(c);
            }
            out
        })
        .collect();

    // At most one blank line between stanzas, none at the edges.
    let mut out = String::with_capacity(unified.len());
    let mut blank_run = 0_usize;
    for line in &lines {
        if line.is_empty() {
            blank_run += 1;
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
            if blank_run > 0 {
                out.push('\n');
            }
        }
        blank_run = 0;
        out.push_str(line);
    }
    out
}

fn canonicalize_diacritics(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if let Some(&mark) = chars.peek() {
            if let Some(&(_, _, composed)) = MARK_SHORTCUTS
                .iter()
                .find(|(base, m, _)| *base == c && *m == mark)
            {
                out.push(composed);
                chars.next();
                continue;
            }
        }
        match LOOKALIKES.iter().find(|(from, _)| *from == c) {
            Some(&(_, to)) => out.push(to),
            None => out.push(c),
        }
    }
    out
}
