//! HEX Uploader command line interface.

use std::{
    path::Path,
    process,
    sync::{
        mpsc::{self, Receiver, RecvTimeoutError},
        Arc,
    },
    thread,
    time::Duration,
};

use clap::{crate_authors, crate_description, crate_version, App, AppSettings::*, Arg};
use console::{style, Term};
use dialoguer::{theme::ColorfulTheme, Confirm, Select};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, trace, LevelFilter};
use simplelog::*;

use hexuploader::{
    self as hu, AppVariant, ArduinoCli, Flasher, HttpFeed, PortDescriptor, ReleaseFeed,
    SerialConnector, Session, SharedSession, StatusSink, Toolchain, Updater, Watcher,
};

fn main() {
    println!("[HU] {} v{}", hu::APP_NAME, crate_version!());

    ctrlc::set_handler(move || {
        println!("🛑 received Ctrl+C!");
        process::exit(0);
    })
    .expect("Failed to install my Ctrl-C handler!");

    let matches = App::new("hexuploader")
        .version(format!("v{}", crate_version!()).as_str())
        .author(crate_authors!())
        .about(crate_description!())
        .long_about(
            "\n\
            HEX Uploader flashes a compiled firmware image (.hex) onto an \
            Arduino Nano or compatible board. It waits for a board to be \
            plugged in, finds out whether the board runs the new (115200 \
            baud) or the old (57600 baud) bootloader, and uploads the image \
            with arduino-cli.\n\
            \n\
            The arduino:avr core is installed on first use. Boards can be \
            plugged and unplugged while HEX Uploader is running; the most \
            recently plugged board is used unless a port is requested with \
            --tty.\
        ",
        )
        .max_term_width(80)
        .setting(ColoredHelp)
        .setting(NextLineHelp)
        .arg(
            Arg::with_name("HEX_FILE")
                .help("path to the firmware image to flash")
                .index(1),
        )
        .arg(
            Arg::with_name("DEVICE_TTY")
                .help("the serial port of the board")
                .long_help(
                    "the serial port of the board; when not set, the most \
                     recently connected board is used, or you are asked to \
                     pick one when several are connected.",
                )
                .short("t")
                .long("tty")
                .takes_value(true)
                .require_equals(true),
        )
        .arg(
            Arg::with_name("APP_VARIANT")
                .help("packaged flavour used to pick update assets")
                .long("variant")
                .takes_value(true)
                .possible_values(&["CLI", "GUI"])
                .default_value("CLI")
                .require_equals(true)
                .hidden(true),
        )
        .arg(
            Arg::with_name("CHECK_UPDATE")
                .help("check whether a newer version is published and exit")
                .long("check-update"),
        )
        .arg(
            Arg::with_name("UPDATE")
                .help("update to the newest published version and exit")
                .long("update")
                .conflicts_with("CHECK_UPDATE"),
        )
        .arg(
            Arg::with_name("YES")
                .help("do not ask for confirmation before updating")
                .short("y")
                .long("yes"),
        )
        .arg(
            Arg::with_name("INSTALL_DRIVERS")
                .help("install the CH340 USB serial drivers (Windows only)")
                .long("install-drivers"),
        )
        .arg(Arg::with_name("v").short("v").multiple(true).help(
            "Sets the logging level of verbosity, repeat several times for \
                higher verbosity",
        ))
        .get_matches();

    // Vary the output based on how many times the user used the "verbose" flag
    // (i.e. 'hexuploader -v -v -v' or 'hexuploader -vvv' vs 'hexuploader -v'
    let log_level = match matches.occurrences_of("v") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    TermLogger::init(
        log_level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .unwrap();

    trace!("{:#?}", matches);

    // Settings ================================================================

    // APP_VARIANT has a default value restricted to the parseable ones.
    let app_variant: AppVariant = matches
        .value_of("APP_VARIANT")
        .unwrap()
        .parse()
        .unwrap_or_else(|e| fail(e));

    let mut builder = hu::SettingsBuilder::default().app_variant(app_variant);
    if let Some(tty) = matches.value_of("DEVICE_TTY") {
        builder = builder.port(tty);
    }
    if let Some(hex_file) = matches.value_of("HEX_FILE") {
        builder = builder.hex_file(hex_file);
    }
    let settings = builder.finalize();

    // Shared state ============================================================

    let status = StatusSink::new(|text| println!("[HU] {}", style(text).cyan()));

    let tmp_dir =
        hu::session::create_tmp_dir(&settings.tmp_dir_name).unwrap_or_else(|e| fail(e));
    let session = SharedSession::new(Session::new(&tmp_dir));

    let feed: Arc<dyn ReleaseFeed> = Arc::new(HttpFeed::new().unwrap_or_else(|e| fail(e)));
    // The relaunched executable only has to prove that it starts.
    let updater = Updater::new(&settings, &tmp_dir, feed.clone(), status.clone())
        .with_relaunch_args(vec!["--version"]);
    updater.clean_old_versions();

    if matches.is_present("INSTALL_DRIVERS") {
        hu::drivers::install_ch340(&tmp_dir, feed.as_ref(), &status);
    }

    // Update ==================================================================

    if matches.is_present("CHECK_UPDATE") || matches.is_present("UPDATE") {
        let code = run_update(
            &updater,
            matches.is_present("UPDATE"),
            matches.is_present("YES"),
        );
        process::exit(code);
    }

    thread::spawn(move || {
        if let Some(version) = updater.check_for_update() {
            println!(
                "[HU] 🎁 {} is available, run with {} to get it",
                style(version).green(),
                style("--update").cyan()
            );
        }
    });

    // Flash ===================================================================

    let hex_file = match &settings.hex_file {
        Some(path) if Path::new(path).is_file() => path.clone(),
        Some(path) => {
            println!(
                "{}: `{}` is not a file",
                style("error").red(),
                style(path).on_red()
            );
            process::exit(-1);
        }
        None => {
            println!(
                "{}: no firmware image given, see `{}`",
                style("error").red(),
                style("hexuploader --help").cyan()
            );
            process::exit(-1);
        }
    };

    let toolchain: Arc<dyn Toolchain> = Arc::new(ArduinoCli::new(settings.poll_interval));

    let (changed_tx, changed_rx) = mpsc::channel();
    Watcher::new(session.clone(), status.clone())
        .spawn(
            toolchain.clone(),
            Some(move || {
                let _ = changed_tx.send(());
            }),
        )
        .unwrap_or_else(|e| fail(e));

    if !hu::check_cores(&session, toolchain.as_ref(), &status) {
        process::exit(1);
    }

    session.lock().select_hex(&hex_file);

    let port = match wait_for_board(&session, settings.port.as_deref(), &changed_rx) {
        Some(port) => port,
        None => process::exit(1),
    };
    if let Err(e) = session.lock().select_port(&port) {
        fail(e);
    }

    let flasher = Flasher::new(
        session,
        toolchain,
        Arc::new(SerialConnector::new(&settings)),
        settings.handshake_timing,
        status,
    );

    // The handshake blocks for seconds at a time, keep it off the main thread.
    let exit_code = match flasher.spawn_flash() {
        Ok(handle) => match handle.join() {
            Ok(Ok(true)) => 0,
            Ok(Ok(false)) | Ok(Err(_)) => 1,
            Err(_) => 2,
        },
        Err(e) => {
            println!("{}: {}", style("error").red(), e);
            1
        }
    };
    debug!("exit code: {}", exit_code);
    process::exit(exit_code);
}

fn fail(error: hu::Error) -> ! {
    println!("{}: {}", style("error").red(), error);
    process::exit(-1);
}

fn run_update(updater: &Updater, apply: bool, assume_yes: bool) -> i32 {
    let version = match updater.check_for_update() {
        Some(version) => version,
        None => {
            println!("[HU] 👍 You are running the newest version");
            return 0;
        }
    };

    println!("[HU] 🎁 {} is available", style(&version).green());
    if !apply {
        return 0;
    }

    let confirmed = assume_yes
        || Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Update to {} now?", version))
            .default(true)
            .interact()
            .unwrap_or(false);
    if !confirmed {
        return 0;
    }

    // Failures were already put on the status line by the updater.
    match updater.update(&version, || println!("[HU] 🚀 Updated to {}", version)) {
        Ok(()) => 0,
        Err(ref e) => {
            debug!("update failed: {:?}", e);
            1
        }
    }
}

/// Waits until a board is attached (the `requested` one if set) and returns
/// its address. With several boards and nothing requested, the user picks.
fn wait_for_board(
    session: &SharedSession,
    requested: Option<&str>,
    changed: &Receiver<()>,
) -> Option<String> {
    let pb = ProgressBar::new_spinner();
    pb.enable_steady_tick(120);
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&["⠋", "⠙", "⠚", "⠞", "⠖", "⠦", "⠴", "⠲", "⠳", "⠓"])
            .template("[HU] {spinner:.blue} {msg}"),
    );

    let mut waited: u64 = 0;
    loop {
        {
            let s = session.lock();
            match requested {
                Some(address) if s.ports().contains_key(address) => {
                    pb.finish_with_message(format!(
                        "👍 Serial port {} is ready",
                        style(address).green()
                    ));
                    return Some(address.to_owned());
                }
                None if !s.ports().is_empty() => {
                    let ports: Vec<PortDescriptor> = s
                        .sorted_addresses()
                        .iter()
                        .filter_map(|a| s.ports().get(a).cloned())
                        .collect();
                    let current = s.current_port().map(str::to_owned);
                    drop(s);
                    pb.finish_and_clear();
                    return choose_port(&ports, current.as_deref());
                }
                _ => {}
            }
        }

        pb.set_message(format!(
            "[{:03}s] ⌛ Waiting for {} to be connected...",
            style(waited).dim(),
            requested
                .map(|a| style(a).cyan().to_string())
                .unwrap_or_else(|| "a board".into())
        ));

        match changed.recv_timeout(Duration::from_secs(1)) {
            Ok(()) => {}
            Err(RecvTimeoutError::Timeout) => waited += 1,
            Err(RecvTimeoutError::Disconnected) => {
                // The watcher is gone, no board will ever show up.
                pb.finish_with_message("❌ Stopped watching for boards");
                return None;
            }
        }
    }
}

fn choose_port(ports: &[PortDescriptor], current: Option<&str>) -> Option<String> {
    if ports.len() == 1 {
        println!("[HU] 👍 Using {}", style(ports[0].label()).green());
        return Some(ports[0].address.clone());
    }

    let labels: Vec<String> = ports.iter().map(PortDescriptor::label).collect();
    let default = current
        .and_then(|c| ports.iter().position(|p| p.address == c))
        .unwrap_or(0);

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select the port of the board to flash:")
        .items(&labels)
        .default(default)
        .interact_on_opt(&Term::stderr());

    match selection {
        Ok(Some(index)) => Some(ports[index].address.clone()),
        Ok(None) => {
            println!("[HU] ❌ No port selected");
            None
        }
        Err(ref e) => {
            debug!("error: {}", e);
            None
        }
    }
}
