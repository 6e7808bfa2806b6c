use crate::models::CounterView;

pub fn render_index(view: &CounterView) -> String {
    let record = view
        .record_anterior
        .map(|value| value.to_string())
        .unwrap_or_else(|| "—".to_string());
    INDEX_HTML
        .replace("{{DIAS}}", &view.dias_sin_accidentes.to_string())
        .replace("{{RECORD}}", &record)
        .replace("{{ACTUALIZACION}}", &view.ultima_actualizacion_formatted)
}

const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="es">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>Días sin accidentes</title>
  <style>
    :root {
      --bg: #0f2a1d;
      --ink: #f4f1e8;
      --accent: #f2b705;
      --danger: #d64933;
      --card: rgba(255, 255, 255, 0.08);
      --shadow: 0 24px 60px rgba(0, 0, 0, 0.35);
    }

    * {
      box-sizing: border-box;
    }

    body {
      margin: 0;
      min-height: 100vh;
      background: radial-gradient(circle at top, #1f5a3a, var(--bg) 70%);
      color: var(--ink);
      font-family: "Trebuchet MS", sans-serif;
      display: grid;
      place-items: center;
      padding: 32px 18px 48px;
    }

    .app {
      width: min(720px, 100%);
      background: var(--card);
      border-radius: 28px;
      box-shadow: var(--shadow);
      padding: 36px;
      display: grid;
      gap: 24px;
      text-align: center;
    }

    h1 {
      margin: 0;
      font-size: clamp(1.8rem, 4vw, 2.6rem);
      letter-spacing: 0.04em;
      text-transform: uppercase;
    }

    .counter {
      font-size: clamp(6rem, 22vw, 11rem);
      font-weight: 700;
      color: var(--accent);
      line-height: 1;
      transition: transform 200ms ease;
    }

    .meta {
      display: grid;
      grid-template-columns: repeat(auto-fit, minmax(200px, 1fr));
      gap: 12px;
    }

    .meta .label {
      display: block;
      font-size: 0.8rem;
      text-transform: uppercase;
      letter-spacing: 0.12em;
      opacity: 0.7;
    }

    .meta .value {
      font-size: 1.3rem;
      font-weight: 600;
    }

    .admin {
      display: none;
      gap: 12px;
      text-align: left;
    }

    .admin.open {
      display: grid;
    }

    input {
      width: 100%;
      padding: 12px 14px;
      border-radius: 12px;
      border: 1px solid rgba(255, 255, 255, 0.2);
      background: rgba(0, 0, 0, 0.25);
      color: var(--ink);
      font-size: 1rem;
    }

    .actions {
      display: grid;
      grid-template-columns: repeat(auto-fit, minmax(160px, 1fr));
      gap: 12px;
    }

    button {
      appearance: none;
      border: none;
      border-radius: 999px;
      padding: 14px 18px;
      font-size: 1rem;
      font-weight: 600;
      cursor: pointer;
    }

    .btn-update {
      background: var(--accent);
      color: #1b1b1b;
    }

    .btn-reset {
      background: var(--danger);
      color: white;
    }

    .btn-toggle {
      background: transparent;
      color: var(--ink);
      border: 1px solid rgba(255, 255, 255, 0.3);
      justify-self: center;
    }

    .status {
      min-height: 1.2em;
      font-size: 0.95rem;
    }

    .status[data-type="error"] {
      color: #ff8a7a;
    }

    .status[data-type="ok"] {
      color: #8be0a4;
    }
  </style>
</head>
<body>
  <main class="app">
    <h1>Días sin accidentes</h1>
    <div id="dias" class="counter">{{DIAS}}</div>

    <section class="meta">
      <div>
        <span class="label">Récord anterior</span>
        <span id="record" class="value">{{RECORD}}</span>
      </div>
      <div>
        <span class="label">Última actualización</span>
        <span id="actualizacion" class="value">{{ACTUALIZACION}}</span>
      </div>
    </section>

    <button id="toggle" class="btn-toggle" type="button">Administrar</button>

    <section id="admin" class="admin">
      <input id="password" type="password" placeholder="Contraseña" autocomplete="current-password" />
      <input id="dias-input" type="number" min="0" placeholder="Días sin accidentes" />
      <input id="record-input" type="number" min="0" placeholder="Récord anterior (opcional)" />
      <div class="actions">
        <button id="update" class="btn-update" type="button">Actualizar</button>
        <button id="reset" class="btn-reset" type="button">Reiniciar</button>
      </div>
    </section>

    <div id="status" class="status"></div>
  </main>

  <script>
    const diasEl = document.getElementById('dias');
    const recordEl = document.getElementById('record');
    const actualizacionEl = document.getElementById('actualizacion');
    const adminEl = document.getElementById('admin');
    const passwordEl = document.getElementById('password');
    const diasInput = document.getElementById('dias-input');
    const recordInput = document.getElementById('record-input');
    const statusEl = document.getElementById('status');

    const setStatus = (message, type) => {
      statusEl.textContent = message;
      statusEl.dataset.type = type || '';
    };

    const render = (data) => {
      diasEl.textContent = data.diasSinAccidentes;
      recordEl.textContent = data.recordAnterior ?? '—';
      actualizacionEl.textContent = data.ultimaActualizacionFormatted;
      diasEl.style.transform = 'scale(1.08)';
      setTimeout(() => { diasEl.style.transform = 'scale(1)'; }, 200);
    };

    const load = async () => {
      const res = await fetch('/api/counter');
      const body = await res.json();
      if (!res.ok || !body.success) {
        throw new Error(body.message || 'No se pudo cargar el contador');
      }
      render(body.data);
    };

    const post = async (path, payload) => {
      setStatus('Guardando...', 'info');
      const res = await fetch(path, {
        method: 'POST',
        headers: { 'content-type': 'application/json' },
        body: JSON.stringify({ password: passwordEl.value, ...payload })
      });
      const body = await res.json();
      if (!res.ok || !body.success) {
        throw new Error(body.message || 'Error en la solicitud');
      }
      render(body.data);
      setStatus(body.message, 'ok');
    };

    document.getElementById('toggle').addEventListener('click', () => {
      adminEl.classList.toggle('open');
    });

    document.getElementById('update').addEventListener('click', () => {
      const payload = { dias: diasInput.value };
      if (recordInput.value !== '') {
        payload.recordAnterior = recordInput.value;
      }
      post('/api/counter/update', payload).catch((err) => setStatus(err.message, 'error'));
    });

    document.getElementById('reset').addEventListener('click', () => {
      if (!confirm('¿Reiniciar el contador a 0?')) {
        return;
      }
      post('/api/counter/reset', {}).catch((err) => setStatus(err.message, 'error'));
    });

    load().catch((err) => setStatus(err.message, 'error'));
    setInterval(() => load().catch(() => {}), 60 * 1000);
  </script>
</body>
</html>
"##;
