fn main() {
    // Dev builds can bake OAuth client credentials in from .env.
    // Variables already set in the environment (CI secrets) take precedence.
    println!("cargo:rerun-if-changed=.env");
    println!("cargo:rerun-if-env-changed=DRIVEPUSH_CLIENT_ID");
    println!("cargo:rerun-if-env-changed=DRIVEPUSH_CLIENT_SECRET");

    let Ok(content) = std::fs::read_to_string(".env") else {
        return;
    };
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            if !key.starts_with("DRIVEPUSH_") {
                continue;
            }
            if std::env::var(key).is_err() {
                println!("cargo:rustc-env={key}={}", value.trim());
            }
        }
    }
}
