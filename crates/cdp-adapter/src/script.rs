//! Page-side helper installed on demand into every document.

use serde_json::Value;

/// Defines `window.__sword` once per document. Element tokens live in a
/// map on that object; a navigation drops the map with the document.
const RUNTIME: &str = r#"
(() => {
  if (window.__sword) return;
  const registry = new Map();
  let seq = 0;
  const token = (el) => {
    if (!el.__swordToken) {
      seq += 1;
      el.__swordToken = 'sw-' + seq;
      registry.set(el.__swordToken, el);
    }
    return el.__swordToken;
  };
  const get = (id) => {
    const el = registry.get(id);
    if (!el || !el.isConnected) {
      registry.delete(id);
      return null;
    }
    return el;
  };
  const snapshot = (el) => {
    const r = el.getBoundingClientRect();
    const style = window.getComputedStyle(el);
    const attributes = {};
    for (const attr of el.attributes) attributes[attr.name] = attr.value;
    return {
      tag: el.tagName,
      id: el.id || null,
      classes: Array.from(el.classList),
      attributes,
      text: (el.textContent || '').trim().slice(0, 500),
      rect: { x: r.left + window.scrollX, y: r.top + window.scrollY, width: r.width, height: r.height },
      disabled: !!el.disabled || el.getAttribute('aria-disabled') === 'true',
      hidden: style.display === 'none' || style.visibility === 'hidden',
    };
  };
  const palette = {
    alert: '#d92d20',
    success: '#039855',
    failure: '#b42318',
    diagnostics: '#344054',
  };
  window.__sword = {
    query(selector, scope) {
      const root = scope ? get(scope) : document;
      if (!root) return [];
      return Array.from(root.querySelectorAll(selector)).map(token);
    },
    inspect(id) {
      const el = get(id);
      return el ? snapshot(el) : null;
    },
    byText(text) {
      const hits = [];
      const walker = document.createTreeWalker(document.body || document.documentElement, NodeFilter.SHOW_ELEMENT);
      for (let node = walker.currentNode; node; node = walker.nextNode()) {
        if (node.id && node.id.startsWith('sword-')) continue;
        if (!(node.textContent || '').includes(text)) continue;
        const inner = Array.from(node.children).some((child) => (child.textContent || '').includes(text));
        if (!inner) hits.push(token(node));
      }
      return hits;
    },
    closest(id, selector) {
      const el = get(id);
      const hit = el ? el.closest(selector) : null;
      return hit ? token(hit) : null;
    },
    click(id) {
      const el = get(id);
      if (!el) return false;
      el.click();
      return true;
    },
    scroll(id) {
      const el = get(id);
      if (!el) return false;
      el.scrollIntoView({ block: 'center', inline: 'center' });
      return true;
    },
    remove(id) {
      const el = get(id);
      if (el) el.remove();
      return true;
    },
    focus(id) {
      const el = get(id);
      if (!el) return false;
      el.focus();
      return true;
    },
    highlight(id) {
      const el = get(id);
      if (!el) return false;
      el.style.outline = '3px solid #d92d20';
      el.style.outlineOffset = '2px';
      return true;
    },
    overlay(panel) {
      let box = document.getElementById(panel.id);
      if (!box) {
        box = document.createElement('div');
        box.id = panel.id;
        document.documentElement.appendChild(box);
      }
      const blocking = panel.kind === 'alert';
      box.style.cssText = [
        'position:fixed',
        blocking ? 'top:50%;left:50%;transform:translate(-50%,-50%)' : 'top:12px;right:12px',
        'z-index:2147483647',
        'padding:12px 16px',
        'border-radius:8px',
        'font:13px/1.5 system-ui,sans-serif',
        'color:#fff',
        'background:' + (palette[panel.kind] || palette.diagnostics),
        'box-shadow:0 4px 16px rgba(0,0,0,.3)',
        'pointer-events:none',
      ].join(';');
      box.replaceChildren();
      const title = document.createElement('strong');
      title.textContent = panel.title;
      box.appendChild(title);
      for (const line of panel.lines || []) {
        const row = document.createElement('div');
        row.textContent = line;
        box.appendChild(row);
      }
      return true;
    },
    clearOverlay(id) {
      const box = document.getElementById(id);
      if (box) box.remove();
      return true;
    },
  };
})()
"#;

/// Expression calling `window.__sword[op](...args)`, installing the helper
/// first when the document does not have it yet.
pub(crate) fn invoke(op: &str, args: &[Value]) -> String {
    let args = args
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("{RUNTIME};\nwindow.__sword.{op}({args})")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn arguments_are_json_literals() {
        let expression = invoke("query", &[json!(".seat[data-row=\"A\"]"), Value::Null]);
        assert!(expression.ends_with(r#"window.__sword.query(".seat[data-row=\"A\"]", null)"#));
        assert!(expression.contains("if (window.__sword) return;"));
    }
}
