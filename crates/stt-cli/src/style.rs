use console::style;

pub const HELP_TEMPLATE: &str = r#"
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading}
{tab}{usage}

{all-args}{after-help}
"#;

pub const BANNER: &str = r#"
 ___ _____ _____
/ __|_   _|_   _|  Speech-to-text inference broker
\__ \ | |   | |    ZeroMQ in, transcriptions out
|___/ |_|   |_|
"#;

/// Theme for styled terminal output
#[derive(Clone)]
pub struct Theme {
    pub accent: fn(&str) -> console::StyledObject<&str>,
    pub success: fn(&str) -> console::StyledObject<&str>,
    pub error: fn(&str) -> console::StyledObject<&str>,
    pub info: fn(&str) -> console::StyledObject<&str>,
    pub muted: fn(&str) -> console::StyledObject<&str>,
    pub no_color: bool,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            accent: |s| style(s).cyan().bold(),
            success: |s| style(s).green().bold(),
            error: |s| style(s).red().bold(),
            info: |s| style(s).blue(),
            muted: |s| style(s).dim(),
            no_color: false,
        }
    }
}

impl Theme {
    pub fn no_color() -> Self {
        Self {
            accent: |s| style(s),
            success: |s| style(s),
            error: |s| style(s),
            info: |s| style(s),
            muted: |s| style(s),
            no_color: true,
        }
    }

    pub fn print_banner(&self) {
        if self.no_color {
            println!("{}", BANNER.trim_start_matches('\n'));
        } else {
            println!("{}", (self.accent)(BANNER.trim_start_matches('\n')));
        }
    }

    /// One aligned `label: value` line of a settings block.
    pub fn setting(&self, label: &str, value: impl std::fmt::Display) {
        println!("  {:<16}{}", format!("{label}:"), value);
    }

    pub fn success(&self, msg: &str) {
        println!("{} {}", (self.success)("✓"), msg);
    }

    pub fn error(&self, msg: &str) {
        eprintln!("{} {}", (self.error)("✗"), msg);
    }

    pub fn info(&self, msg: &str) {
        println!("{} {}", (self.info)("ℹ"), msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_color_theme_leaves_text_plain() {
        let theme = Theme::no_color();
        for paint in [theme.accent, theme.success, theme.error, theme.info, theme.muted] {
            assert_eq!(paint("stt").to_string(), "stt");
        }
    }
}
