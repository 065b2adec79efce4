//! Home-directory path rewriting for restored trees
//!
//! Archives made on one machine embed that machine's home directory in
//! config files, lockfiles and scripts. Before a restored tree is applied,
//! the most common foreign home is detected and rewritten to the current one.
//!
//! A candidate is `/root/` or `/home/<name>/`, also recognised without the
//! leading slash (`home/<name>/`, as found in relative references). An
//! absolute occurrence must not be preceded by a name character
//! (`[A-Za-z0-9._-]`); a slashless one must not be preceded by a name
//! character or `/`. When the current home is not itself a candidate (for
//! example `/home/bob/work/`), its literal matches are counted under the
//! current home and candidates inside them are ignored. A candidate that is a
//! prefix of the current home counts as the current home. Only occurrences
//! that satisfy those rules are counted, and exactly the counted occurrences
//! are rewritten, so the current home always outnumbers every other candidate
//! afterwards and a second pass finds nothing to do.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use walkdir::WalkDir;

use crate::error::{SkillvaultError, SkillvaultResult};
use crate::storage::write_bytes_atomic;

/// Directories never descended into
const SKIPPED_DIRS: [&str; 3] = [".git", ".hg", ".svn"];

/// Extensions treated as binary without reading them
const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "tiff", "zip", "gz", "tgz", "bz2", "xz",
    "zst", "tar", "7z", "rar", "jar", "whl", "woff", "woff2", "ttf", "otf", "eot", "mp3", "mp4",
    "wav", "ogg", "flac", "mov", "avi", "webm", "exe", "dll", "so", "dylib", "o", "a", "class",
    "pyc", "pdf", "sqlite", "db", "gpg",
];

/// Outcome of one sanitizing pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SanitizeReport {
    /// Current home with a trailing slash
    pub current_home: String,
    /// Home that was rewritten, if any
    pub original_home: Option<String>,
    /// Candidate counts before rewriting
    pub candidates: BTreeMap<String, usize>,
    pub files_scanned: usize,
    pub files_rewritten: usize,
    pub replacements: usize,
    /// Foreign candidates still present afterwards
    pub remaining: BTreeMap<String, usize>,
}

impl SanitizeReport {
    pub fn changed(&self) -> bool {
        self.files_rewritten > 0
    }

    pub fn is_clean(&self) -> bool {
        self.remaining.is_empty()
    }
}

/// Rewrites foreign home-directory prefixes to the current home
#[derive(Debug, Clone)]
pub struct PathSanitizer {
    home_key: String,
    home_detectable: bool,
}

impl PathSanitizer {
    pub fn new(current_home: &Path) -> Self {
        let raw = current_home.to_string_lossy();
        let home_key = format!("{}/", raw.trim_end_matches('/'));
        let home_detectable = match occurrences(&home_key).as_slice() {
            [only] => only.start == 0 && only.end == home_key.len(),
            _ => false,
        };
        Self {
            home_key,
            home_detectable,
        }
    }

    /// Current home with a trailing slash
    pub fn current_home(&self) -> &str {
        &self.home_key
    }

    /// Count candidate prefixes under `root`
    pub fn scan(&self, root: &Path) -> SkillvaultResult<BTreeMap<String, usize>> {
        let files = collect_files(root)?;
        let mut counts = BTreeMap::new();
        for path in &files {
            if let Some(content) = Content::load(path) {
                content.count(self, &mut counts);
            }
        }
        Ok(counts)
    }

    /// The most frequent candidate, or `None` when that is already the current home
    ///
    /// Ties go to the current home or its prefixes, then to the
    /// lexicographically greatest candidate.
    pub fn select_source(&self, counts: &BTreeMap<String, usize>) -> Option<String> {
        let (winner, _) = counts
            .iter()
            .filter(|(_, &n)| n > 0)
            .max_by(|(a, na), (b, nb)| {
                na.cmp(nb)
                    .then_with(|| self.is_current(a).cmp(&self.is_current(b)))
                    .then_with(|| a.cmp(b))
            })?;
        if self.is_current(winner) {
            None
        } else {
            Some(winner.clone())
        }
    }

    /// Detect the dominant foreign home under `root` and rewrite it in place
    pub fn sanitize(&self, root: &Path) -> SkillvaultResult<SanitizeReport> {
        let files = collect_files(root)?;
        let mut report = SanitizeReport {
            current_home: self.home_key.clone(),
            files_scanned: files.len(),
            ..Default::default()
        };

        let mut loaded: Vec<(PathBuf, Content)> = files
            .into_iter()
            .filter_map(|p| Content::load(&p).map(|c| (p, c)))
            .collect();
        for (_, content) in &loaded {
            content.count(self, &mut report.candidates);
        }

        let Some(original) = self.select_source(&report.candidates) else {
            tracing::debug!(home = %self.home_key, "no foreign home paths found");
            report.remaining = self.foreign(&report.candidates);
            return Ok(report);
        };
        tracing::info!(from = %original, to = %self.home_key, "rewriting home paths");

        for (path, content) in loaded.iter_mut() {
            let replaced = content.rewrite(self, &original);
            if replaced == 0 {
                continue;
            }
            match content.to_bytes() {
                Ok(bytes) => {
                    write_bytes_atomic(&*path, &bytes)?;
                    report.files_rewritten += 1;
                    report.replacements += replaced;
                }
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "could not rewrite file"),
            }
        }

        let mut after = BTreeMap::new();
        for (_, content) in &loaded {
            content.count(self, &mut after);
        }
        report.remaining = self.foreign(&after);
        if !report.remaining.is_empty() {
            tracing::warn!(remaining = ?report.remaining, "foreign home paths remain after rewrite");
        }
        report.original_home = Some(original);

        Ok(report)
    }

    fn foreign(&self, counts: &BTreeMap<String, usize>) -> BTreeMap<String, usize> {
        counts
            .iter()
            .filter(|(k, &n)| !self.is_current(k) && n > 0)
            .map(|(k, &n)| (k.clone(), n))
            .collect()
    }

    /// The current home itself, or a candidate it starts with
    fn is_current(&self, candidate: &str) -> bool {
        self.home_key.starts_with(candidate)
    }

    /// Occurrences that take part in counting and rewriting, ordered by position
    fn counted(&self, text: &str) -> Vec<Occurrence> {
        let found = occurrences(text);
        if self.home_detectable {
            return found;
        }

        let homes: Vec<Occurrence> = text
            .match_indices(self.home_key.as_str())
            .map(|(i, m)| Occurrence {
                start: i,
                end: i + m.len(),
                candidate: self.home_key.clone(),
            })
            .collect();
        let mut counted: Vec<Occurrence> = found
            .into_iter()
            .filter(|o| !homes.iter().any(|h| o.start < h.end && h.start < o.end))
            .collect();
        counted.extend(homes);
        counted.sort_by_key(|o| o.start);
        counted
    }

    fn count_text(&self, text: &str, counts: &mut BTreeMap<String, usize>) {
        for occ in self.counted(text) {
            *counts.entry(occ.candidate).or_default() += 1;
        }
    }

    /// Replace every counted occurrence of `original` with the current home
    fn rewrite_text(&self, text: &str, original: &str) -> Option<(String, usize)> {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        let mut replaced = 0;
        for occ in self
            .counted(text)
            .into_iter()
            .filter(|o| o.candidate == original)
        {
            out.push_str(&text[last..occ.start]);
            out.push_str(&self.home_key);
            last = occ.end;
            replaced += 1;
        }
        if replaced == 0 {
            return None;
        }
        out.push_str(&text[last..]);
        Some((out, replaced))
    }
}

/// A located candidate prefix
#[derive(Debug, Clone, PartialEq, Eq)]
struct Occurrence {
    start: usize,
    end: usize,
    /// Normalised absolute form with trailing slash
    candidate: String,
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-')
}

/// Every candidate occurrence in `text`, ordered by position; never overlapping
fn occurrences(text: &str) -> Vec<Occurrence> {
    let bytes = text.as_bytes();
    let mut found = Vec::new();

    for (i, _) in text.match_indices("/root/") {
        if i == 0 || !is_name_byte(bytes[i - 1]) {
            found.push(Occurrence {
                start: i,
                end: i + "/root/".len(),
                candidate: "/root/".to_string(),
            });
        }
    }

    for (i, _) in text.match_indices("home/") {
        let name_start = i + "home/".len();
        let name_len = bytes[name_start..]
            .iter()
            .take_while(|b| is_name_byte(**b))
            .count();
        if name_len == 0 || bytes.get(name_start + name_len) != Some(&b'/') {
            continue;
        }
        let end = name_start + name_len + 1;
        let candidate = format!("/home/{}/", &text[name_start..name_start + name_len]);

        match i.checked_sub(1).map(|p| bytes[p]) {
            Some(b'/') => {
                let start = i - 1;
                if start == 0 || !is_name_byte(bytes[start - 1]) {
                    found.push(Occurrence {
                        start,
                        end,
                        candidate,
                    });
                }
            }
            Some(b) if is_name_byte(b) => {}
            _ => found.push(Occurrence {
                start: i,
                end,
                candidate,
            }),
        }
    }

    found.sort_by_key(|o| o.start);
    found
}

/// A scannable file; JSON documents are handled value by value
enum Content {
    Text(String),
    Json(Value),
}

impl Content {
    fn load(path: &Path) -> Option<Self> {
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "skipping unreadable file");
                return None;
            }
        };
        let text = String::from_utf8(bytes).ok()?;

        let is_json = path
            .extension()
            .map_or(false, |e| e.eq_ignore_ascii_case("json"));
        if is_json {
            if let Ok(value) = serde_json::from_str::<Value>(&text) {
                return Some(Content::Json(value));
            }
        }
        Some(Content::Text(text))
    }

    fn count(&self, sanitizer: &PathSanitizer, counts: &mut BTreeMap<String, usize>) {
        match self {
            Content::Text(text) => sanitizer.count_text(text, counts),
            Content::Json(value) => {
                visit_strings(value, &mut |s| sanitizer.count_text(s, counts));
            }
        }
    }

    fn rewrite(&mut self, sanitizer: &PathSanitizer, original: &str) -> usize {
        match self {
            Content::Text(text) => match sanitizer.rewrite_text(text, original) {
                Some((new, n)) => {
                    *text = new;
                    n
                }
                None => 0,
            },
            Content::Json(value) => {
                let mut total = 0;
                visit_strings_mut(value, &mut |s| {
                    if let Some((new, n)) = sanitizer.rewrite_text(s, original) {
                        *s = new;
                        total += n;
                    }
                });
                total
            }
        }
    }

    fn to_bytes(&self) -> SkillvaultResult<Vec<u8>> {
        match self {
            Content::Text(text) => Ok(text.clone().into_bytes()),
            Content::Json(value) => {
                let mut out = serde_json::to_string_pretty(value)
                    .map_err(|e| SkillvaultError::Json(e.to_string()))?;
                out.push('\n');
                Ok(out.into_bytes())
            }
        }
    }
}

fn visit_strings(value: &Value, f: &mut impl FnMut(&str)) {
    match value {
        Value::String(s) => f(s),
        Value::Array(items) => items.iter().for_each(|v| visit_strings(v, f)),
        Value::Object(map) => map.values().for_each(|v| visit_strings(v, f)),
        _ => {}
    }
}

fn visit_strings_mut(value: &mut Value, f: &mut impl FnMut(&mut String)) {
    match value {
        Value::String(s) => f(s),
        Value::Array(items) => items.iter_mut().for_each(|v| visit_strings_mut(v, f)),
        Value::Object(map) => map.values_mut().for_each(|v| visit_strings_mut(v, f)),
        _ => {}
    }
}

/// Regular files under `root`, skipping VCS metadata and binary extensions
fn collect_files(root: &Path) -> SkillvaultResult<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(SkillvaultError::NotFound {
            entity_type: "Directory",
            identifier: root.display().to_string(),
        });
    }

    let files = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            !(e.file_type().is_dir()
                && e.file_name()
                    .to_str()
                    .map_or(false, |n| SKIPPED_DIRS.contains(&n)))
        })
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(err) => {
                tracing::debug!(error = %err, "skipping unreadable entry");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| !is_binary_path(p))
        .collect();
    Ok(files)
}

fn is_binary_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |ext| {
            BINARY_EXTENSIONS
                .iter()
                .any(|b| b.eq_ignore_ascii_case(ext))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn candidates(text: &str) -> Vec<String> {
        occurrences(text).into_iter().map(|o| o.candidate).collect()
    }

    fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
        WalkDir::new(root)
            .into_iter()
            .map(|e| e.unwrap())
            .filter(|e| e.file_type().is_file())
            .map(|e| (e.path().to_path_buf(), fs::read(e.path()).unwrap()))
            .collect()
    }

    #[test]
    fn test_detects_both_slash_forms() {
        assert_eq!(candidates("cd /home/alice/src"), vec!["/home/alice/"]);
        assert_eq!(candidates("path=home/alice/src"), vec!["/home/alice/"]);
        assert_eq!(candidates("\"/root/.cache\""), vec!["/root/"]);
        assert_eq!(candidates("file:///home/alice/x"), vec!["/home/alice/"]);
    }

    #[test]
    fn test_boundary_rules() {
        assert!(candidates("/mnt/home/alice/x").is_empty());
        assert!(candidates("myhome/alice/x").is_empty());
        assert!(candidates("/srv/root/x").is_empty());
        assert!(candidates("/home/alice").is_empty());
        assert!(candidates("/home//x").is_empty());
        assert_eq!(
            candidates("/home/alice//home/carol/"),
            vec!["/home/alice/", "/home/carol/"]
        );
    }

    #[test]
    fn test_select_source_prefers_frequency_then_home() {
        let sanitizer = PathSanitizer::new(Path::new("/home/bob"));
        let mut counts = BTreeMap::new();
        counts.insert("/home/alice/".to_string(), 3);
        counts.insert("/root/".to_string(), 1);
        assert_eq!(sanitizer.select_source(&counts).as_deref(), Some("/home/alice/"));

        counts.insert("/home/bob/".to_string(), 3);
        assert_eq!(sanitizer.select_source(&counts), None);

        counts.remove("/home/bob/");
        counts.insert("/home/carol/".to_string(), 3);
        assert_eq!(sanitizer.select_source(&counts).as_deref(), Some("/home/carol/"));

        assert_eq!(sanitizer.select_source(&BTreeMap::new()), None);
    }

    #[test]
    fn test_sanitize_rewrites_text_and_json() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(root.join("run.sh"), "cd /home/alice/work && ls home/alice/data\n").unwrap();
        fs::write(
            root.join("settings.json"),
            r#"{"cwd": "/home/alice/proj", "count": 2, "list": ["home/alice/x"]}"#,
        )
        .unwrap();
        fs::write(root.join("other.txt"), "owner /home/carol/ stays\n").unwrap();

        let sanitizer = PathSanitizer::new(Path::new("/home/bob"));
        let report = sanitizer.sanitize(root).unwrap();

        assert_eq!(report.original_home.as_deref(), Some("/home/alice/"));
        assert_eq!(report.files_rewritten, 2);
        assert_eq!(report.replacements, 4);
        assert_eq!(
            fs::read_to_string(root.join("run.sh")).unwrap(),
            "cd /home/bob/work && ls /home/bob/data\n"
        );

        let json: Value =
            serde_json::from_str(&fs::read_to_string(root.join("settings.json")).unwrap()).unwrap();
        assert_eq!(json["cwd"], "/home/bob/proj");
        assert_eq!(json["list"][0], "/home/bob/x");
        assert_eq!(json["count"], 2);
        let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["cwd", "count", "list"]);

        assert_eq!(report.remaining.get("/home/carol/"), Some(&1));
        assert!(!report.is_clean());
    }

    #[test]
    fn test_root_home_to_user_home() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.conf"), "dir=/root/.agent\n").unwrap();

        let report = PathSanitizer::new(Path::new("/home/bob/"))
            .sanitize(temp.path())
            .unwrap();
        assert_eq!(report.original_home.as_deref(), Some("/root/"));
        assert_eq!(
            fs::read_to_string(temp.path().join("a.conf")).unwrap(),
            "dir=/home/bob/.agent\n"
        );
        assert!(report.is_clean());
    }

    #[test]
    fn test_skips_binary_vcs_and_invalid_json() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join(".git/config"), "/home/alice/").unwrap();
        fs::write(root.join("logo.png"), "/home/alice/").unwrap();
        fs::write(root.join("blob.bin"), [0xff, 0xfe, b'/', b'h']).unwrap();
        fs::write(root.join("broken.json"), "{ not json /home/alice/x").unwrap();

        let report = PathSanitizer::new(Path::new("/home/bob"))
            .sanitize(root)
            .unwrap();
        assert_eq!(report.files_rewritten, 1);
        assert_eq!(fs::read_to_string(root.join(".git/config")).unwrap(), "/home/alice/");
        assert_eq!(fs::read_to_string(root.join("logo.png")).unwrap(), "/home/alice/");
        assert_eq!(
            fs::read_to_string(root.join("broken.json")).unwrap(),
            "{ not json /home/bob/x"
        );
    }

    #[test]
    fn test_noop_when_already_home() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "/home/bob/a /home/bob/b /root/c").unwrap();
        let before = snapshot(temp.path());

        let report = PathSanitizer::new(Path::new("/home/bob"))
            .sanitize(temp.path())
            .unwrap();
        assert!(report.original_home.is_none());
        assert!(!report.changed());
        assert_eq!(snapshot(temp.path()), before);
    }

    #[test]
    fn test_undetectable_home_still_wins_second_pass() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("a.txt"),
            "/home/alice/1 /home/alice/2 /home/carol/3\n",
        )
        .unwrap();
        let sanitizer = PathSanitizer::new(Path::new("/Users/bob"));

        let first = sanitizer.sanitize(temp.path()).unwrap();
        assert_eq!(first.original_home.as_deref(), Some("/home/alice/"));
        let second = sanitizer.sanitize(temp.path()).unwrap();
        assert!(second.original_home.is_none());
        assert_eq!(
            fs::read_to_string(temp.path().join("a.txt")).unwrap(),
            "/Users/bob/1 /Users/bob/2 /home/carol/3\n"
        );
    }

    #[test]
    fn test_nested_home_keeps_correct_paths() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a.txt");
        fs::write(&file, "/home/bob/work/a /home/bob/other /home/alice/x /home/alice/y").unwrap();
        let sanitizer = PathSanitizer::new(Path::new("/home/bob/work"));

        let counts = sanitizer.scan(temp.path()).unwrap();
        assert_eq!(counts.get("/home/bob/work/"), Some(&1));
        assert_eq!(counts.get("/home/bob/"), Some(&1));
        assert_eq!(counts.get("/home/alice/"), Some(&2));

        let report = sanitizer.sanitize(temp.path()).unwrap();
        assert_eq!(report.original_home.as_deref(), Some("/home/alice/"));
        assert_eq!(report.replacements, 2);
        assert!(report.is_clean());
        assert_eq!(
            fs::read_to_string(&file).unwrap(),
            "/home/bob/work/a /home/bob/other /home/bob/work/x /home/bob/work/y"
        );
    }

    #[test]
    fn test_nested_home_prefix_is_never_the_source() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a.txt");
        fs::write(&file, "/home/bob/work/a /home/bob/b /home/bob/c /home/alice/x").unwrap();
        let before = snapshot(temp.path());

        let report = PathSanitizer::new(Path::new("/home/bob/work"))
            .sanitize(temp.path())
            .unwrap();
        assert!(report.original_home.is_none());
        assert_eq!(report.remaining.get("/home/alice/"), Some(&1));
        assert!(!report.remaining.contains_key("/home/bob/"));
        assert_eq!(snapshot(temp.path()), before);
    }

    #[test]
    fn test_missing_root_is_not_found() {
        let temp = TempDir::new().unwrap();
        let err = PathSanitizer::new(Path::new("/home/bob"))
            .sanitize(&temp.path().join("absent"))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    fn token() -> impl Strategy<Value = &'static str> {
        prop::sample::select(vec![
            "/home/alice/x",
            "home/alice/y",
            "/home/carol/z",
            "home/carol/",
            "/root/w",
            "/Users/bob/v",
            "/home/bob/u",
            "/home/bob/work/t",
            "/mnt/home/alice/q",
            "plain",
        ])
    }

    fn separator() -> impl Strategy<Value = &'static str> {
        prop::sample::select(vec![" ", "\n", "\"", "/", ":", "="])
    }

    fn document() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec((token(), separator()), 0..12)
            .prop_map(|parts| parts.into_iter().map(|(t, s)| format!("{t}{s}")).collect())
    }

    proptest! {
        #[test]
        fn prop_second_pass_changes_nothing(
            texts in prop::collection::vec(document(), 1..4),
            json_strings in document(),
            home in prop::sample::select(vec!["/home/bob", "/root", "/Users/bob", "/home/alice", "/home/bob/work"]),
        ) {
            let temp = TempDir::new().unwrap();
            for (i, parts) in texts.iter().enumerate() {
                fs::write(temp.path().join(format!("f{i}.txt")), parts.concat()).unwrap();
            }
            let doc = serde_json::json!({ "paths": json_strings, "n": 1 });
            fs::write(temp.path().join("doc.json"), doc.to_string()).unwrap();

            let sanitizer = PathSanitizer::new(Path::new(home));
            sanitizer.sanitize(temp.path()).unwrap();
            let after_first = snapshot(temp.path());

            let second = sanitizer.sanitize(temp.path()).unwrap();
            prop_assert_eq!(second.files_rewritten, 0);
            prop_assert!(second.original_home.is_none());
            prop_assert_eq!(snapshot(temp.path()), after_first);
        }
    }
}
