//! Query-word → canonical-tag lookup used to bias ranking toward topically
//! relevant results. The table is immutable and built once at startup.

use std::collections::HashMap;
use std::sync::LazyLock;

static TAG_TABLE: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("go", "go"),
        ("golang", "go"),
        ("python", "python"),
        ("py", "python"),
        ("javascript", "javascript"),
        ("js", "javascript"),
        ("node", "node.js"),
        ("typescript", "typescript"),
        ("ts", "typescript"),
        ("java", "java"),
        ("c++", "c++"),
        ("cpp", "c++"),
        ("c#", "c#"),
        ("csharp", "c#"),
        ("ruby", "ruby"),
        ("rust", "rust"),
        ("swift", "swift"),
        ("kotlin", "kotlin"),
        ("php", "php"),
        ("bash", "bash"),
        ("shell", "bash"),
        ("sql", "sql"),
        ("mysql", "mysql"),
        ("postgres", "postgresql"),
        ("react", "reactjs"),
        ("docker", "docker"),
        ("kubernetes", "kubernetes"),
        ("k8s", "kubernetes"),
        ("git", "git"),
    ])
});

/// Extracts likely technology tags from a free-text query.
///
/// Each lowercase word is looked up in the canonical table; matches are
/// returned in query order, deduplicated. An empty result is normal; hints
/// only bias selection, they never gate it.
pub fn detect_tag_hints(query: &str) -> Vec<String> {
    let mut seen: Vec<&str> = Vec::new();
    for word in query.to_lowercase().split_whitespace() {
        if let Some(&tag) = TAG_TABLE.get(word)
            && !seen.contains(&tag)
        {
            seen.push(tag);
        }
    }
    seen.into_iter().map(String::from).collect()
}
