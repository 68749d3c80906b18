pub const PAGE_GROUP_SIZE: u32 = 5;

/// Which page buttons to show around the current (0-based) page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageWindow {
    pub current: u32,
    pub last_page: u32,
    pub pages: Vec<u32>,
    pub has_prev: bool,
    pub has_next: bool,
}

impl PageWindow {
    /// `last_page` is the page count as reported by the API (1-based).
    /// Returns `None` when there is nothing to paginate. A `current` past the
    /// end (a stale link) shows the last group.
    pub fn new(current: u32, last_page: u32) -> Option<Self> {
        if last_page <= 1 {
            return None;
        }
        let shown = current.min(last_page - 1);
        let start = shown / PAGE_GROUP_SIZE * PAGE_GROUP_SIZE;
        let end = (start + PAGE_GROUP_SIZE).min(last_page);
        Some(Self {
            current,
            last_page,
            pages: (start..end).collect(),
            has_prev: current > 0,
            has_next: current < last_page - 1,
        })
    }

    pub fn prev(&self) -> Option<u32> {
        if self.current >= self.last_page {
            return Some(self.last_page - 1);
        }
        self.has_prev.then(|| self.current - 1)
    }

    pub fn next(&self) -> Option<u32> {
        self.has_next.then(|| self.current + 1)
    }

    pub fn render(&self) -> String {
        let buttons: Vec<String> = self
            .pages
            .iter()
            .map(|&p| {
                if p == self.current {
                    format!("[{}]", p + 1)
                } else {
                    format!("{}", p + 1)
                }
            })
            .collect();
        format!(
            "{} {} {}",
            if self.has_prev { "<" } else { " " },
            buttons.join(" "),
            if self.has_next { ">" } else { " " }
        )
    }
}
