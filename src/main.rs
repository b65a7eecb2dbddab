use anyhow::Context;
use clap::Parser;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{info, warn};
use voltray::app::{HotkeyControl, VolumeControl};
use voltray::cli::Cli;
use voltray::hotkey::{x11, Keybinder};
use voltray::log;
use voltray::mixer::{self, BackendKind};
use voltray::settings::{self, Settings};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    log::parse_log_level();

    let settings = settings::scaffold()
        .map(|dir| Settings::init(dir, &cli.config))
        .unwrap_or_else(|e| {
            warn!("settings will not be saved: {}", e);
            Settings::ephemeral()
        });

    let (kind, scale, device, channel) = {
        let mixer = settings.r().mixer();
        (
            cli.backend.unwrap_or(mixer.backend),
            mixer.scale(),
            cli.device.clone().unwrap_or_else(|| mixer.card.clone()),
            mixer.channel.clone(),
        )
    };

    let control = VolumeControl::new(mixer::create_backend(kind, scale), Arc::clone(&settings));
    let setup = control.borrow_mut().setup(&device, channel.as_deref());
    if let Err(e) = setup {
        match kind {
            BackendKind::Oss => log::oops(format!("cannot open the OSS mixer: {}", e), 1),
            BackendKind::Alsa => warn!("no usable mixer on '{}', staying idle: {}", device, e),
        }
    }

    let _hotkeys = match x11::X11Provider::connect() {
        Ok(provider) => {
            let binder = Rc::new(RefCell::new(Keybinder::new(provider)));
            let hotkeys = HotkeyControl::new(Rc::clone(&binder), &control, Arc::clone(&settings));
            hotkeys.bind_enabled();
            if x11::attach(&binder).is_none() {
                warn!("hotkeys stopped, the X11 connection is gone");
            }
            Some(hotkeys)
        }
        Err(e) => {
            warn!("hotkeys disabled: {}", e);
            None
        }
    };

    let main_loop = glib::MainLoop::new(None, false);
    let quit = main_loop.clone();
    ctrlc::set_handler(move || quit.quit()).context("failed to install the Ctrl-C handler")?;
    main_loop.run();

    info!("voltray exiting, goodbye");
    Ok(())
}
