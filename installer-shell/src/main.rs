use installer_shell::shell::sequence::RunMode;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    // Non-interactive smoke mode (for automated checks).
    // Renders a single frame for a specific dialog to stdout and exits 0.
    // Usage: --smoke or --smoke=welcome|license|maintenance|ready|progress|exit
    if let Some(arg) = args
        .iter()
        .find(|a| a.as_str() == "--smoke" || a.starts_with("--smoke="))
    {
        let target = arg
            .split_once('=')
            .map(|(_, v)| v.to_string())
            .filter(|v| !v.trim().is_empty());
        installer_shell::run_smoke(target);
        return;
    }

    // Play mode: walk a dialog list in the terminal; the engine is never started.
    // Usage: --play=Welcome,License,Ready,Exit [--properties=NAME=VALUE;NAME=VALUE]
    if let Some(list) = args.iter().find_map(|a| a.strip_prefix("--play=")) {
        let properties = args
            .iter()
            .find_map(|a| a.strip_prefix("--properties="))
            .map(str::to_string);
        installer_shell::run_play(list, properties);
        return;
    }

    // Scripted engine without any dialogs; the run log goes to stdout.
    if args.iter().any(|a| a == "--headless-demo") {
        installer_shell::run_headless_demo();
        return;
    }

    if args.iter().any(|a| a == "--demo-repair") {
        installer_shell::run_demo(RunMode::Modify);
        return;
    }

    if args.iter().any(|a| a == "--demo") {
        installer_shell::run_demo(RunMode::Install);
        return;
    }

    // No flag: INSTALLER_SHELL_UI / installer-shell.toml decide between terminal and headless.
    installer_shell::run_default();
}
