use std::{cell::RefCell, rc::Rc, time::Duration};

use tripmap::{
    demo_travelers, ContainerRef, HeadlessProvider, MapView, ProviderRegistry, TripmapConfig,
};

/// Headless walkthrough of a travel-companion page.
///
/// Pass a JSON configuration file as the first argument to override the
/// defaults. The provider load is held back for a moment to show the view
/// waiting in `provider-loading`.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => TripmapConfig::from_file(path)?,
        None => TripmapConfig::default(),
    };

    // Views and providers are single-threaded, so everything runs on a LocalSet
    let local = tokio::task::LocalSet::new();
    local.run_until(run(config)).await
}

async fn run(config: TripmapConfig) -> Result<(), Box<dyn std::error::Error>> {
    let provider = Rc::new(HeadlessProvider::deferred());
    let registry = ProviderRegistry::with_policy(provider.clone(), config.bootstrap);

    let page = MapView::new(registry.clone(), ContainerRef::new("travel-map"))
        .with_options(config.map.clone())
        .with_points(demo_travelers().to_vec());

    let activations = Rc::new(RefCell::new(Vec::new()));
    let sink = activations.clone();
    page.on_activate(move |point| {
        println!("  -> selected {} ({})", point.display_name, point.id);
        sink.borrow_mut().push(point.id);
    });

    page.mount();
    println!("mounted: {}", page.state());

    let loader = provider.clone();
    tokio::task::spawn_local(async move {
        tokio::time::sleep(Duration::from_millis(250)).await;
        loader.finish_load();
    })
    .await?;
    println!("provider {}: {}", registry.state(), page.state());

    if let Some(hint) = page.overlay() {
        println!("overlay: {} / {}", hint.heading, hint.body);
    }

    page.set_travel_mode(true);
    println!(
        "travel mode on: {} with markers {:?}",
        page.state(),
        page.marker_point_ids()
    );

    for point in demo_travelers().iter().take(2) {
        provider.click_point(point.id);
        if let Some(card) = page.popup() {
            println!("  popup: {} / {}", card.title, card.subtitle.unwrap_or_default());
        }
    }
    page.dismiss_selection();

    page.set_travel_mode(false);
    println!("travel mode off: {} markers", page.marker_count());

    page.reinitialize(config.map.with_zoom(4.0))?;
    println!("re-initialized: {}", page.state());

    page.unmount();
    println!(
        "unmounted: {} (loader insertions: {}, live maps: {}, activations: {:?})",
        page.state(),
        provider.loader_insertions(),
        provider.live_instances(),
        activations.borrow()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_walkthrough_runs_with_defaults() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(run(TripmapConfig::default()))
            .await
            .expect("walkthrough should finish cleanly");
    }
}
