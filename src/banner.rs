// src/banner.rs

/// Prints the application startup banner to the console.
pub fn print_banner() {
    let banner = r#"
                    _                       _
   ___ ___   __| | ___ _ __   __ _  __| |
  / __/ _ \ / _` |/ _ \ '_ \ / _` |/ _` |
 | (_| (_) | (_| |  __/ |_) | (_| | (_| |
  \___\___/ \__,_|\___| .__/ \__,_|\__,_|
                      |_|

    Problems, Submissions & Live Verdicts
"#;
    println!("{}", banner);
}
