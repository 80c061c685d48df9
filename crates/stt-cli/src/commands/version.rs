use crate::style::Theme;
use clap::crate_version;
use console::style;

pub fn execute(full: bool, theme: &Theme) {
    theme.print_banner();

    println!("{}", style(format!("Version: {}", crate_version!())).bold());

    if full {
        println!("\n{}", style("Build Info:").bold());
        println!(
            "  Target:    {}-{}",
            std::env::consts::OS,
            std::env::consts::ARCH
        );
        println!("  Core:      stt-core {}", crate_version!());

        println!("\n{}", style("Wire Protocol:").bold());
        println!("  Transport: ZeroMQ ROUTER (in) / DEALER (out)");
        println!("  Encoding:  MessagePack, named fields");
        println!("  Audio:     wav, flac");

        println!("\n{}", style("License:").bold());
        println!("  Apache 2.0");
    }
}
