//! In-page function sources used with `Runtime.callFunctionOn`.
//!
//! Every function runs with `this` bound to the node being operated on.
//!
//! Relative and directional queries share one shape: a body that builds an
//! ordered `list` of candidate elements, wrapped either as a *count*
//! function (returns `list.length`) or an *item* function (returns
//! `list[i]`). Callers count first, then fetch by index. Both passes
//! recompute `list`, so a page that mutates between them can shift results.

// ============================================================================
// Node Functions
// ============================================================================

/// `textContent` of the node.
pub(crate) const TEXT: &str = "function() { return this.textContent; }";

/// Bounding client rect as a plain object.
pub(crate) const RECT: &str = "function() {
    const r = this.getBoundingClientRect();
    return { x: r.x, y: r.y, width: r.width, height: r.height };
}";

/// Whether the node is attached, styled visible and has a box.
pub(crate) const IS_DISPLAYED: &str = "function() {
    if (!this.isConnected) return false;
    const el = this.nodeType === 1 ? this : this.parentElement;
    if (!el) return false;
    const s = getComputedStyle(el);
    if (s.display === 'none' || s.visibility === 'hidden') return false;
    const r = el.getBoundingClientRect();
    return r.width > 0 || r.height > 0;
}";

/// Whether the node is still in a document.
pub(crate) const IS_CONNECTED: &str = "function() { return this.isConnected; }";

/// Scrolls the element into view and dispatches a click.
pub(crate) const CLICK: &str = "function() {
    if (this.scrollIntoView) this.scrollIntoView({ block: 'center', inline: 'center' });
    this.click();
}";

// ============================================================================
// Scoped Path Search
// ============================================================================

/// Number of XPath matches with `this` as context node.
pub(crate) const XPATH_COUNT: &str = "function(xp) {
    const doc = this.ownerDocument || document;
    return doc.evaluate(xp, this, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null).snapshotLength;
}";

/// The `i`-th XPath match with `this` as context node.
pub(crate) const XPATH_ITEM: &str = "function(xp, i) {
    const doc = this.ownerDocument || document;
    return doc.evaluate(xp, this, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null).snapshotItem(i);
}";

// ============================================================================
// Relative Queries
// ============================================================================

/// Helpers shared by relative query bodies.
///
/// `all(k, v)` lists every element matching locator kind `k` and query `v`
/// in document order; `matches(el, k, v)` tests one element.
const PRELUDE: &str = "
    const doc = this.ownerDocument || document;
    const all = (k, v) => {
        if (k === 'xpath') {
            const r = doc.evaluate(v, doc, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
            const out = [];
            for (let n = 0; n < r.snapshotLength; n++) out.push(r.snapshotItem(n));
            return out;
        }
        return Array.from(doc.querySelectorAll(v));
    };
    let pool = null;
    const matches = (el, k, v) => {
        if (k === 'xpath') {
            if (pool === null) pool = new Set(all(k, v));
            return pool.has(el);
        }
        return el.nodeType === 1 && el.matches(v);
    };
";

/// Ancestors, nearest first.
pub(crate) const PARENTS: &str = "
    const list = [];
    for (let p = this.parentElement; p; p = p.parentElement) {
        if (matches(p, k, v)) list.push(p);
    }
";

/// Element children in order.
pub(crate) const CHILDREN: &str = "
    const list = Array.from(this.children).filter(e => matches(e, k, v));
";

/// Following siblings, nearest first.
pub(crate) const NEXTS: &str = "
    const list = [];
    for (let s = this.nextElementSibling; s; s = s.nextElementSibling) {
        if (matches(s, k, v)) list.push(s);
    }
";

/// Preceding siblings, nearest first.
pub(crate) const PREVS: &str = "
    const list = [];
    for (let s = this.previousElementSibling; s; s = s.previousElementSibling) {
        if (matches(s, k, v)) list.push(s);
    }
";

/// Matches after this node in document order, excluding descendants.
pub(crate) const AFTERS: &str = "
    const list = all(k, v).filter(e => {
        const pos = this.compareDocumentPosition(e);
        return (pos & Node.DOCUMENT_POSITION_FOLLOWING)
            && !(pos & Node.DOCUMENT_POSITION_CONTAINED_BY);
    });
";

/// Matches before this node in document order, nearest first, excluding ancestors.
pub(crate) const BEFORES: &str = "
    const list = all(k, v).filter(e => {
        const pos = this.compareDocumentPosition(e);
        return (pos & Node.DOCUMENT_POSITION_PRECEDING)
            && !(pos & Node.DOCUMENT_POSITION_CONTAINS);
    }).reverse();
";

/// Matches lying entirely in compass direction `d`, nearest centre first.
///
/// Ties keep document order (`Array.prototype.sort` is stable).
pub(crate) const DIRECTIONAL: &str = "
    const a = this.getBoundingClientRect();
    const ax = a.left + a.width / 2;
    const ay = a.top + a.height / 2;
    const beyond = {
        east: r => r.left >= a.right,
        west: r => r.right <= a.left,
        north: r => r.bottom <= a.top,
        south: r => r.top >= a.bottom,
    }[d];
    const list = all(k, v)
        .filter(e => e !== this)
        .map(e => ({ e, r: e.getBoundingClientRect() }))
        .filter(({ r }) => (r.width > 0 || r.height > 0) && beyond(r))
        .map(({ e, r }) => ({
            e,
            dist: Math.hypot(r.left + r.width / 2 - ax, r.top + r.height / 2 - ay),
        }))
        .sort((p, q) => p.dist - q.dist)
        .map(({ e }) => e);
";

/// Wraps a query body as a function returning the number of candidates.
///
/// Arguments: `(k, v, d)`.
pub(crate) fn count_function(body: &str) -> String {
    format!("function(k, v, d) {{{PRELUDE}{body}    return list.length;\n}}")
}

/// Wraps a query body as a function returning the `i`-th candidate or `null`.
///
/// Arguments: `(k, v, d, i)`.
pub(crate) fn item_function(body: &str) -> String {
    format!("function(k, v, d, i) {{{PRELUDE}{body}    return list[i] || null;\n}}")
}

// ============================================================================
// Tests
// ============================================================================
