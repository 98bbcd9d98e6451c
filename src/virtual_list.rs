use crate::mirror::NodeId;
use crate::renderer::{Prop, Renderer, STYLE_PROP};
use serde_json::json;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum ItemHeights {
    Uniform { count: usize, height: f64 },
    /// `prefix[i]` is the summed height of items `0..i`; `prefix.len()` is
    /// the item count plus one.
    Variable { prefix: Vec<f64> },
}

impl ItemHeights {
    pub fn uniform(count: usize, height: f64) -> Self {
        ItemHeights::Uniform {
            count,
            height: height.max(0.0),
        }
    }

    pub fn variable(heights: impl IntoIterator<Item = f64>) -> Self {
        let mut prefix = vec![0.0];
        let mut total = 0.0;
        for height in heights {
            total += height.max(0.0);
            prefix.push(total);
        }
        ItemHeights::Variable { prefix }
    }

    pub fn count(&self) -> usize {
        match self {
            ItemHeights::Uniform { count, .. } => *count,
            ItemHeights::Variable { prefix } => prefix.len() - 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn offset_of(&self, index: usize) -> f64 {
        match self {
            ItemHeights::Uniform { count, height } => index.min(*count) as f64 * height,
            ItemHeights::Variable { prefix } => prefix[index.min(prefix.len() - 1)],
        }
    }

    pub fn height_of(&self, index: usize) -> f64 {
        self.offset_of(index + 1) - self.offset_of(index)
    }

    pub fn total(&self) -> f64 {
        self.offset_of(self.count())
    }

    fn index_at(&self, y: f64) -> usize {
        let last = self.count().saturating_sub(1);
        if y <= 0.0 {
            return 0;
        }

        let index = match self {
            ItemHeights::Uniform { height, .. } if *height > 0.0 => (y / height) as usize,
            ItemHeights::Uniform { .. } => last,
            ItemHeights::Variable { prefix } => prefix[1..].partition_point(|end| *end <= y),
        };
        index.min(last)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowParams {
    pub offset: f64,
    pub viewport: f64,
    pub buffer_multiplier: f64,
    pub header_height: f64,
}

impl Default for WindowParams {
    fn default() -> Self {
        Self {
            offset: 0.0,
            viewport: 800.0,
            buffer_multiplier: 1.0,
            header_height: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub lo: usize,
    pub hi: usize,
}

impl Window {
    pub fn len(&self) -> usize {
        self.hi - self.lo + 1
    }

    pub fn contains(&self, index: usize) -> bool {
        (self.lo..=self.hi).contains(&index)
    }
}

/// Items whose span intersects `[offset - buffer, offset + viewport + buffer]`.
pub fn compute_window(heights: &ItemHeights, params: &WindowParams) -> Option<Window> {
    if heights.is_empty() {
        return None;
    }

    let buffer = params.viewport.max(0.0) * params.buffer_multiplier.max(0.0);
    let start = params.offset - buffer - params.header_height;
    let end = params.offset + params.viewport.max(0.0) + buffer - params.header_height;

    let lo = heights.index_at(start);
    let hi = heights.index_at(end).max(lo);
    Some(Window { lo, hi })
}

pub fn item_top(heights: &ItemHeights, index: usize, header_height: f64) -> f64 {
    header_height + heights.offset_of(index)
}

pub fn content_height(heights: &ItemHeights, header_height: f64) -> f64 {
    header_height + heights.total()
}

pub struct VirtualList {
    container: NodeId,
    heights: ItemHeights,
    params: WindowParams,
    window: Option<Window>,
    items: BTreeMap<usize, NodeId>,
    container_style: Option<Prop>,
}

impl VirtualList {
    pub fn new(container: NodeId, heights: ItemHeights, params: WindowParams) -> Self {
        Self {
            container,
            heights,
            params,
            window: None,
            items: BTreeMap::new(),
            container_style: None,
        }
    }

    pub fn window(&self) -> Option<Window> {
        self.window
    }

    pub fn materialized(&self) -> impl Iterator<Item = (usize, NodeId)> + '_ {
        self.items.iter().map(|(index, node)| (*index, *node))
    }

    pub fn materialized_count(&self) -> usize {
        self.items.len()
    }

    pub fn content_height(&self) -> f64 {
        content_height(&self.heights, self.params.header_height)
    }

    /// Re-windows at `offset`. Work is proportional to the window, not the
    /// list length.
    pub fn scroll_to<R, F>(&mut self, renderer: &mut R, offset: f64, render_item: F)
    where
        R: Renderer + ?Sized,
        F: FnMut(&mut R, usize) -> NodeId,
    {
        self.params.offset = offset.max(0.0);
        self.sync(renderer, render_item);
    }

    pub fn set_viewport<R, F>(&mut self, renderer: &mut R, viewport: f64, render_item: F)
    where
        R: Renderer + ?Sized,
        F: FnMut(&mut R, usize) -> NodeId,
    {
        self.params.viewport = viewport.max(0.0);
        self.sync(renderer, render_item);
    }

    pub fn set_heights<R, F>(&mut self, renderer: &mut R, heights: ItemHeights, render_item: F)
    where
        R: Renderer + ?Sized,
        F: FnMut(&mut R, usize) -> NodeId,
    {
        for (_, node) in std::mem::take(&mut self.items) {
            renderer.remove(node);
        }
        self.window = None;
        self.heights = heights;
        self.sync(renderer, render_item);
    }

    fn sync<R, F>(&mut self, renderer: &mut R, mut render_item: F)
    where
        R: Renderer + ?Sized,
        F: FnMut(&mut R, usize) -> NodeId,
    {
        self.update_container(renderer);

        let next = compute_window(&self.heights, &self.params);
        if next == self.window && next.is_some() {
            return;
        }

        let leaving: Vec<usize> = match next {
            Some(window) => self
                .items
                .keys()
                .copied()
                .filter(|index| !window.contains(*index))
                .collect(),
            None => self.items.keys().copied().collect(),
        };
        for index in leaving {
            if let Some(node) = self.items.remove(&index) {
                renderer.remove(node);
            }
        }

        if let Some(window) = next {
            for index in window.lo..=window.hi {
                if self.items.contains_key(&index) {
                    continue;
                }
                let node = render_item(&mut *renderer, index);
                self.position(renderer, node, index);
                let anchor = self
                    .items
                    .range(index + 1..)
                    .next()
                    .map(|(_, node)| *node);
                renderer.insert(node, self.container, anchor);
                self.items.insert(index, node);
            }
        }

        self.window = next;
    }

    fn position<R: Renderer + ?Sized>(&self, renderer: &mut R, node: NodeId, index: usize) {
        let style = Prop::Value(json!({
            "position": "absolute",
            "left": 0,
            "right": 0,
            "top": item_top(&self.heights, index, self.params.header_height),
            "height": self.heights.height_of(index),
        }));
        renderer.patch_prop(node, STYLE_PROP, None, Some(&style));
    }

    fn update_container<R: Renderer + ?Sized>(&mut self, renderer: &mut R) {
        let next = Prop::Value(json!({ "height": self.content_height() }));
        let prev = self.container_style.take();
        renderer.patch_prop(self.container, STYLE_PROP, prev.as_ref(), Some(&next));
        self.container_style = Some(next);
    }
}

impl std::fmt::Debug for VirtualList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualList")
            .field("container", &self.container)
            .field("window", &self.window)
            .field("materialized", &self.items.len())
            .finish()
    }
}
