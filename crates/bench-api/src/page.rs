/// Form page. Results are appended as the `result` events arrive; all backend text is set via `textContent`.
pub const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Model Bench</title>
<style>
  body { font-family: system-ui, sans-serif; background: #f8f9fa; margin: 0; }
  main { max-width: 800px; margin: 40px auto; }
  form, .result { background: #fff; border-radius: 8px; padding: 16px; box-shadow: 0 2px 4px rgba(0,0,0,.1); }
  label { display: block; margin-top: 10px; font-weight: 600; }
  input, textarea { width: 100%; box-sizing: border-box; padding: 6px; }
  .result { margin-top: 10px; }
  .ok { color: #198754; } .fail { color: #dc3545; }
  pre { white-space: pre-wrap; }
</style>
</head>
<body>
<main>
  <h2>Model Bench</h2>
  <form id="bench">
    <label for="endpoint">Endpoint URL</label>
    <input id="endpoint" name="endpoint" placeholder="http://localhost:11434" required>
    <label for="auth_token">Auth key (optional)</label>
    <input id="auth_token" name="auth_token" type="password">
    <label for="models">Models (comma separated)</label>
    <input id="models" name="models" placeholder="llama3, mistral" required>
    <label for="prompt">Prompt</label>
    <textarea id="prompt" name="prompt" rows="4" required></textarea>
    <p><button type="submit">Run benchmark</button> <span id="state"></span></p>
  </form>
  <div id="results"></div>
</main>
<script>
const form = document.getElementById('bench');
const results = document.getElementById('results');
const state = document.getElementById('state');

function field(label, value, cls) {
  const div = document.createElement('div');
  if (cls) div.className = cls;
  const strong = document.createElement('strong');
  strong.textContent = label + ': ';
  div.appendChild(strong);
  div.appendChild(document.createTextNode(value));
  return div;
}

function render(name, data) {
  if (name === 'result') {
    const card = document.createElement('div');
    card.className = 'result';
    const ok = data.status === 'success';
    card.appendChild(field('Model', data.model));
    card.appendChild(field('Status', ok ? 'Success' : 'Failed (' + data.status + ')', ok ? 'ok' : 'fail'));
    card.appendChild(field('Response Time', (data.latency_ms / 1000).toFixed(2) + 's'));
    const pre = document.createElement('pre');
    pre.textContent = data.response_text;
    card.appendChild(pre);
    results.appendChild(card);
  } else if (name === 'done') {
    state.textContent = 'Done: ' + data.succeeded + '/' + data.total + ' succeeded';
  }
}

form.addEventListener('submit', async (ev) => {
  ev.preventDefault();
  results.replaceChildren();
  state.textContent = 'Processing models...';
  const body = Object.fromEntries(new FormData(form).entries());
  const resp = await fetch('/benchmark', {
    method: 'POST',
    headers: { 'Content-Type': 'application/json' },
    body: JSON.stringify(body),
  });
  if (!resp.ok) {
    const err = await resp.json().catch(() => ({ error: resp.statusText }));
    state.textContent = 'Error: ' + err.error;
    return;
  }
  const reader = resp.body.getReader();
  const decoder = new TextDecoder();
  let buffer = '';
  for (;;) {
    const { value, done } = await reader.read();
    if (done) break;
    buffer += decoder.decode(value, { stream: true });
    let cut;
    while ((cut = buffer.indexOf('\n\n')) >= 0) {
      const frame = buffer.slice(0, cut);
      buffer = buffer.slice(cut + 2);
      let name = 'message', data = '';
      for (const line of frame.split('\n')) {
        if (line.startsWith('event:')) name = line.slice(6).trim();
        else if (line.startsWith('data:')) data += line.slice(5).trim();
      }
      if (data) render(name, JSON.parse(data));
    }
  }
});
</script>
</body>
</html>
"#;
