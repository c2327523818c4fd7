use gtk4::prelude::*;
use gtk4::{self, Align};
#[cfg(target_os = "linux")]
use gtk4_layer_shell::LayerShell;

use crate::app::{LocalCommand, ViewSink};
use crate::event::ToggleAction;

/// View updates marshalled from the event loop onto the GTK main thread.
#[derive(Debug, Clone)]
pub enum ViewCommand {
    Text(String),
    Opacity(f64),
    Status(String),
    Link(bool),
}

/// `ViewSink` that forwards to the GTK thread.
pub struct GtkView {
    sender: async_channel::Sender<ViewCommand>,
}

impl GtkView {
    pub fn new(sender: async_channel::Sender<ViewCommand>) -> Self {
        Self { sender }
    }

    fn push(&self, command: ViewCommand) {
        if self.sender.try_send(command).is_err() {
            log::debug!("Overlay window gone, dropping view update");
        }
    }
}

impl ViewSink for GtkView {
    fn set_text(&self, text: &str) {
        self.push(ViewCommand::Text(text.to_string()));
    }

    fn set_opacity(&self, opacity: f64) {
        self.push(ViewCommand::Opacity(opacity));
    }

    fn set_status(&self, status: &str) {
        self.push(ViewCommand::Status(status.to_string()));
    }

    fn set_link(&self, alive: bool) {
        self.push(ViewCommand::Link(alive));
    }
}

/// Handles returned from building the overlay window.
pub struct OverlayWidgets {
    pub window: gtk4::Window,
    pub caption_label: gtk4::Label,
    pub status_label: gtk4::Label,
    pub link_indicator: gtk4::Label,
}

/// Apply one view update to the widgets.
pub fn apply_view_command(overlay: &OverlayWidgets, command: ViewCommand) {
    match command {
        ViewCommand::Text(text) => overlay.caption_label.set_text(&text),
        ViewCommand::Opacity(opacity) => {
            overlay.caption_label.set_opacity(opacity);
            if opacity > 0.0 {
                overlay.window.set_visible(true);
            }
        }
        ViewCommand::Status(status) => {
            overlay.status_label.set_visible(!status.is_empty());
            overlay.status_label.set_text(&status);
        }
        ViewCommand::Link(alive) => {
            if alive {
                overlay.link_indicator.remove_css_class("link-down");
                overlay.link_indicator.set_tooltip_text(Some("Bus connected"));
            } else {
                overlay.link_indicator.add_css_class("link-down");
                overlay.link_indicator.set_tooltip_text(Some("No bus heartbeat"));
            }
        }
    }
}

/// Build the caption bar with its mic toggle.
pub fn build_overlay(
    app: &libadwaita::Application,
    control_sender: async_channel::Sender<LocalCommand>,
) -> OverlayWidgets {
    let window = gtk4::Window::builder()
        .application(app)
        .title("GAINS")
        .decorated(false)
        .resizable(false)
        .default_width(560)
        .default_height(48)
        .build();

    window.add_css_class("caption-overlay");

    let css_provider = gtk4::CssProvider::new();
    css_provider.load_from_string(
        r#"
        window.caption-overlay {
            background-color: transparent;
        }
        .caption-bar {
            background-color: rgba(30, 30, 30, 0.90);
            border-radius: 24px;
            padding: 8px 20px;
        }
        .caption-text {
            color: white;
            font-size: 16px;
            transition: opacity 300ms ease-out;
        }
        .caption-status {
            color: rgba(255, 255, 255, 0.7);
            font-size: 13px;
        }
        .link-indicator {
            color: #57e389;
            font-size: 10px;
        }
        .link-indicator.link-down {
            color: #f66151;
        }
        "#,
    );
    if let Some(display) = gtk4::gdk::Display::default() {
        gtk4::style_context_add_provider_for_display(
            &display,
            &css_provider,
            gtk4::STYLE_PROVIDER_PRIORITY_APPLICATION,
        );
    }

    let hbox = gtk4::Box::new(gtk4::Orientation::Horizontal, 12);
    hbox.set_halign(Align::Center);
    hbox.set_valign(Align::Center);
    hbox.add_css_class("caption-bar");

    let mic_button = gtk4::ToggleButton::with_label("\u{1F3A4}");
    mic_button.set_tooltip_text(Some("Start / stop listening"));

    let caption_label = gtk4::Label::new(None);
    caption_label.add_css_class("caption-text");
    caption_label.set_wrap(true);
    caption_label.set_max_width_chars(60);
    caption_label.set_opacity(0.0);

    let status_label = gtk4::Label::new(None);
    status_label.add_css_class("caption-status");
    status_label.set_visible(false);

    // Down until the first heartbeat arrives.
    let link_indicator = gtk4::Label::new(Some("\u{25cf}"));
    link_indicator.add_css_class("link-indicator");
    link_indicator.add_css_class("link-down");
    link_indicator.set_tooltip_text(Some("No bus heartbeat"));

    hbox.append(&link_indicator);
    hbox.append(&mic_button);
    hbox.append(&status_label);
    hbox.append(&caption_label);
    window.set_child(Some(&hbox));

    mic_button.connect_toggled(move |button| {
        let action = if button.is_active() {
            ToggleAction::Start
        } else {
            ToggleAction::Stop
        };
        let _ = control_sender.try_send(LocalCommand::Toggle(action));
    });

    // Platform-specific window positioning
    #[cfg(target_os = "linux")]
    {
        let is_wayland = std::env::var("XDG_SESSION_TYPE")
            .map(|s| s == "wayland")
            .unwrap_or(false);

        if is_wayland && gtk4_layer_shell::is_supported() {
            window.init_layer_shell();
            window.set_layer(gtk4_layer_shell::Layer::Overlay);
            window.set_anchor(gtk4_layer_shell::Edge::Bottom, true);
            window.set_margin(gtk4_layer_shell::Edge::Bottom, 30);
            window.set_anchor(gtk4_layer_shell::Edge::Left, false);
            window.set_anchor(gtk4_layer_shell::Edge::Right, false);
        }
    }

    window.connect_close_request(|w| {
        w.set_visible(false);
        gtk4::glib::Propagation::Stop
    });

    OverlayWidgets {
        window,
        caption_label,
        status_label,
        link_indicator,
    }
}
