use std::fs;
use std::io;
use std::path::Path;

use tracing::info;

const PLACEHOLDERS: [(&str, &str); 4] = [
    ("index.html", INDEX_HTML),
    ("style.css", STYLE_CSS),
    ("script.js", SCRIPT_JS),
    ("another.html", ANOTHER_HTML),
];

/// Creates `root` and writes the placeholder site into it.
///
/// Existing files are never overwritten. Returns the names of the files that
/// were written.
pub fn ensure_static_root(root: &Path) -> io::Result<Vec<&'static str>> {
    fs::create_dir_all(root)?;

    let mut written = Vec::new();
    for (name, contents) in PLACEHOLDERS {
        let path = root.join(name);
        if path.exists() {
            continue;
        }
        fs::write(&path, contents.trim_start())?;
        info!(path = %path.display(), "wrote placeholder file");
        written.push(name);
    }

    Ok(written)
}

const INDEX_HTML: &str = r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>PocketServe Static</title>
    <link rel="stylesheet" href="style.css">
</head>
<body>
    <h1>Welcome to PocketServe!</h1>
    <p>This is a static HTML file served by the server.</p>
    <p>Place your static files (HTML, CSS, JS, images) in the static root directory.</p>
    <p><a href="/api/serve/another.html">Try another page</a></p>
    <script src="script.js"></script>
</body>
</html>
"#;

const STYLE_CSS: &str = r"
body {
    font-family: sans-serif;
    line-height: 1.6;
    padding: 20px;
    background-color: #f4f4f4;
    color: #333;
}
h1 {
    color: #008080;
}
code {
    background-color: #e0e0e0;
    padding: 2px 5px;
    border-radius: 3px;
}
a {
    color: #005050;
}
";

const SCRIPT_JS: &str = r"
console.log('PocketServe static script loaded!');

document.addEventListener('DOMContentLoaded', () => {
    console.log('Static page DOM fully loaded and parsed');
});
";

const ANOTHER_HTML: &str = r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Another Page</title>
    <link rel="stylesheet" href="style.css">
</head>
<body>
    <h1>Another Static Page</h1>
    <p>This demonstrates serving a different HTML file.</p>
    <p><a href="/api/serve/index.html">Back to Home</a></p>
    <script src="script.js"></script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_missing_root_and_placeholders() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("public/static");

        let written = ensure_static_root(&root).unwrap();

        assert_eq!(written, ["index.html", "style.css", "script.js", "another.html"]);
        let index = fs::read_to_string(root.join("index.html")).unwrap();
        assert!(index.starts_with("<!DOCTYPE html>"));
    }

    #[test]
    fn existing_files_are_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.html"), "mine").unwrap();

        let written = ensure_static_root(dir.path()).unwrap();

        assert!(!written.contains(&"index.html"));
        assert_eq!(fs::read_to_string(dir.path().join("index.html")).unwrap(), "mine");
        assert!(ensure_static_root(dir.path()).unwrap().is_empty());
    }
}
