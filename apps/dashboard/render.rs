use crate::networks::explorer_address_url;
use futures::StreamExt;
use metasync::{
    BindingHandle, ContentAddress, IdeaMetaProvider, IdeaStatistics, MetaCache, NullFallback,
    ProposalStatus, Reactive, RenderTarget, StatisticsProvider, Visibility,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

/// Headless stand-in for a labelled UI element. Keeps what it shows and logs
/// every change.
#[derive(Clone)]
pub struct Panel {
    name: &'static str,
    state: Arc<Mutex<PanelState>>,
}

#[derive(Debug, Default)]
struct PanelState {
    text: String,
    link: Option<String>,
    loading: bool,
    visible: bool,
}

impl Panel {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Arc::new(Mutex::new(PanelState {
                visible: true,
                ..Default::default()
            })),
        }
    }

    pub fn set(&self, text: impl Into<String>, link: Option<String>) {
        let mut state = self.state.lock();
        state.text = text.into();
        state.link = link;
        info!(panel = self.name, text = %state.text, link = ?state.link, "Panel updated");
    }

    pub fn text(&self) -> String {
        self.state.lock().text.clone()
    }

    pub fn link(&self) -> Option<String> {
        self.state.lock().link.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().loading
    }

    pub fn is_visible(&self) -> bool {
        self.state.lock().visible
    }
}

impl RenderTarget for Panel {
    fn shimmer(&mut self) {
        self.state.lock().loading = true;
        info!(panel = self.name, "Loading");
    }

    fn clear_loading(&mut self) {
        self.state.lock().loading = false;
    }
}

impl Visibility for Panel {
    fn set_visible(&mut self, visible: bool) {
        let mut state = self.state.lock();
        if state.visible != visible {
            state.visible = visible;
            info!(panel = self.name, visible, "Panel visibility changed");
        }
    }
}

pub fn format_statistics(stats: &IdeaStatistics) -> String {
    format!(
        "{} votes, {} pending, {} successful, {} rejected",
        stats.total_votes,
        stats.count(ProposalStatus::Pending),
        stats.count(ProposalStatus::Successful),
        stats.count(ProposalStatus::Rejected),
    )
}

/// Key facts about the Idea, kept live while the drawer is alive.
pub struct SideDrawer {
    pub author: Panel,
    pub data_id: Panel,
    pub statistics: Panel,
    pub no_statistics: Panel,
    _bindings: Vec<BindingHandle>,
}

impl SideDrawer {
    pub fn bind(
        cache: &MetaCache,
        meta: Arc<IdeaMetaProvider>,
        stats: Arc<StatisticsProvider>,
        explorer: &str,
        gateway: &str,
    ) -> Self {
        let author = Panel::new("Created by");
        let data_id = Panel::new("Data ID");
        let statistics = Panel::new("Statistics");
        let no_statistics = Panel::new("No statistics");

        let bindings = vec![
            bind_author(cache, stats.clone(), author.clone(), explorer.to_string()),
            bind_data_id(cache, meta, data_id.clone(), gateway.to_string()),
            bind_statistics(cache, stats, statistics.clone(), no_statistics.clone()),
        ];

        Self {
            author,
            data_id,
            statistics,
            no_statistics,
            _bindings: bindings,
        }
    }
}

fn bind_author(
    cache: &MetaCache,
    stats: Arc<StatisticsProvider>,
    panel: Panel,
    explorer: String,
) -> BindingHandle {
    let init = {
        let (cache, stats) = (cache.clone(), stats.clone());
        async move {
            cache
                .resolve_document_as::<IdeaStatistics>(stats.as_ref())
                .await
                .unwrap_or_default()
                .author
        }
    };
    let cache = cache.clone();

    Reactive::new(panel, move |author: String, panel: &mut Panel| {
        let link = explorer_address_url(&explorer, &author);
        panel.set(author, Some(link));
    })
    .bind(
        init,
        move || cache.watch(stats),
        |document| {
            serde_json::from_value::<IdeaStatistics>((*document).clone())
                .unwrap_or_default()
                .author
        },
    )
}

fn bind_data_id(
    cache: &MetaCache,
    meta: Arc<IdeaMetaProvider>,
    panel: Panel,
    gateway: String,
) -> BindingHandle {
    let init = {
        let (cache, meta) = (cache.clone(), meta.clone());
        async move { cache.resolve_address(meta.as_ref()).await }
    };
    let cache = cache.clone();

    let render = move |address: Option<ContentAddress>, panel: &mut Panel| match address {
        Some(address) => {
            let link = format!("{}/ipfs/{}", gateway.trim_end_matches('/'), address);
            panel.set(address.to_string(), Some(link));
        }
        None => panel.set("unavailable", None),
    };

    Reactive::new(panel, render)
        .with_placeholder(|panel: &mut Panel| {
            panel.shimmer();
            panel.set("\u{a0}", None);
        })
        .bind(
            init,
            move || {
                let updates = cache.watch(meta.clone());
                updates.then(move |_| {
                    let (cache, meta) = (cache.clone(), meta.clone());
                    async move { cache.resolve_address(meta.as_ref()).await }
                })
            },
            |address| address,
        )
}

fn bind_statistics(
    cache: &MetaCache,
    stats: Arc<StatisticsProvider>,
    panel: Panel,
    fallback: Panel,
) -> BindingHandle {
    let init = {
        let (cache, stats) = (cache.clone(), stats.clone());
        async move {
            cache
                .resolve_document_as::<IdeaStatistics>(stats.as_ref())
                .await
        }
    };
    let cache = cache.clone();
    let mut toggle = NullFallback::new(panel.clone(), fallback);

    Reactive::new(panel, move |value: Option<IdeaStatistics>, panel: &mut Panel| {
        if let Some(stats) = toggle.apply(value) {
            panel.set(format_statistics(&stats), None);
        }
    })
    .bind(
        init,
        move || cache.watch(stats),
        |document| serde_json::from_value::<IdeaStatistics>((*document).clone()).ok(),
    )
}
