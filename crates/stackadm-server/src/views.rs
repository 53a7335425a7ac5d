//! Server-rendered HTML pages.
//!
//! Plain HTML with inline CSS and a few lines of inline script for the JSON
//! actions (version update, backup create/delete/restore). Every value that
//! comes from outside the binary goes through [`escape_html`].

use stackadm_core::backup::BackupInfo;
use stackadm_core::keycloak::KeycloakUser;
use stackadm_core::step::{StepId, StepStatus};
use stackadm_core::versions::ComponentVersion;

/// Kind of a one-shot message shown above a form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashKind {
    Success,
    Error,
}

/// A message shown once above a form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flash {
    pub kind: FlashKind,
    pub text: String,
}

impl Flash {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Success,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Error,
            text: text.into(),
        }
    }
}

/// Escape `&`, `<`, `>`, `"` and `'` for HTML text and attribute values.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Byte count as B / KB / MB / GB with one decimal.
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = UNITS[0];
    for next in &UNITS[1..] {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = next;
    }
    format!("{value:.1} {unit}")
}

// ── Setup wizard ─────────────────────────────────────────────────────

pub fn setup_form_page() -> String {
    setup_shell("Initial Settings", SETUP_FORM)
}

/// A step is queued or running. Reloads itself every five seconds.
pub fn progress_page(step: StepId, status: StepStatus, logs: &str) -> String {
    let mut content = String::with_capacity(logs.len() + 1024);
    content.push_str(r#"<meta http-equiv="refresh" content="5"/>"#);
    content.push_str(r#"<div class="card"><div class="card-header"><span class="card-title">"#);
    content.push_str(step.title());
    content.push_str(r#"</span><span class="badge badge-info">"#);
    content.push_str(status.as_str());
    content.push_str(r#"</span></div><div class="card-body"><p class="muted">Setup is running. This page refreshes automatically.</p>"#);
    push_steps(&mut content, Some(step));
    content.push_str(r#"<h4>Container logs</h4><pre class="code-block">"#);
    content.push_str(&escape_html(logs));
    content.push_str("</pre></div></div>");
    setup_shell("Setup in progress", &content)
}

/// A step failed; show its log.
pub fn failed_page(step: StepId, log: &str) -> String {
    let mut content = String::with_capacity(log.len() + 1024);
    content.push_str(r#"<div class="card"><div class="card-header"><span class="card-title">"#);
    content.push_str(step.title());
    content.push_str(r#"</span><span class="badge badge-danger">failed</span></div><div class="card-body">"#);
    content.push_str(r#"<p class="muted">The step <code>"#);
    content.push_str(step.as_str());
    content.push_str(r#"</code> did not finish. Fix the cause shown below on the host, then reset the setup state to retry.</p>"#);
    push_steps(&mut content, Some(step));
    content.push_str(r#"<h4>Setup log</h4><pre class="code-block">"#);
    content.push_str(&escape_html(log));
    content.push_str("</pre></div></div>");
    setup_shell("Setup failed", &content)
}

pub fn complete_page(domain: Option<&str>) -> String {
    let mut content = String::with_capacity(1024);
    content.push_str(r#"<div class="card"><div class="card-body"><h3>Setup complete</h3><p class="muted">All services are up.</p>"#);
    if let Some(domain) = domain.filter(|d| !d.is_empty()) {
        let domain = escape_html(domain);
        content.push_str(r#"<p><a class="btn btn-primary" href="https://"#);
        content.push_str(&domain);
        content.push_str(r#"/">Open https://"#);
        content.push_str(&domain);
        content.push_str("</a></p>");
    }
    content.push_str(r#"<p><a href="/versions">Versions</a> · <a href="/backup">Backups</a> · <a href="/logs">Logs</a> · <a href="/keycloak/add-user">Users</a></p></div></div>"#);
    app_shell("Welcome", "", &content)
}

fn push_steps(html: &mut String, current: Option<StepId>) {
    html.push_str(r#"<ol class="steps">"#);
    for id in StepId::ALL {
        html.push_str(if Some(id) == current {
            r#"<li class="current">"#
        } else {
            "<li>"
        });
        html.push_str(id.title());
        html.push_str("</li>");
    }
    html.push_str("</ol>");
}

// ── Maintenance pages ────────────────────────────────────────────────

pub fn versions_page(rows: &[ComponentVersion]) -> String {
    let mut content = String::with_capacity(4096);
    content.push_str(r#"<div class="card"><div class="card-header"><span class="card-title">Component versions</span><button class="btn btn-primary btn-sm" onclick="updateVersions(this)">Update all</button></div><table class="table"><thead><tr><th>Component</th><th>Variable</th><th>Current</th><th>Latest</th><th></th></tr></thead><tbody>"#);
    for row in rows {
        content.push_str("<tr><td>");
        content.push_str(&escape_html(&row.app_name));
        content.push_str("</td><td><code>");
        content.push_str(&escape_html(&row.env_var));
        content.push_str("</code></td><td>");
        content.push_str(&escape_html(&row.current_version));
        content.push_str("</td><td>");
        if row.latest_version.is_empty() {
            content.push_str(r#"<span class="muted">unknown</span>"#);
        } else {
            content.push_str(&escape_html(&row.latest_version));
        }
        content.push_str("</td><td>");
        content.push_str(if row.needs_update {
            r#"<span class="badge badge-warning">update available</span>"#
        } else {
            r#"<span class="badge badge-success">up to date</span>"#
        });
        content.push_str("</td></tr>");
    }
    content.push_str(r#"</tbody></table></div><div id="result"></div>"#);
    content.push_str(VERSIONS_SCRIPT);
    app_shell("Versions", "versions", &content)
}

pub fn backups_page(backups: &[BackupInfo]) -> String {
    let mut content = String::with_capacity(4096);
    content.push_str(r#"<div class="card"><div class="card-header"><span class="card-title">Create backup</span></div><div class="card-body"><div class="form-group"><input class="form-input" id="description" placeholder="Description (optional)"/></div><button class="btn btn-primary" onclick="createBackup(this)">Create backup</button></div></div>"#);
    content.push_str(r#"<div class="card"><div class="card-header"><span class="card-title">Backups</span></div>"#);
    if backups.is_empty() {
        content.push_str(r#"<div class="card-body"><p class="muted">No backups yet.</p></div>"#);
    } else {
        content.push_str(r#"<table class="table"><thead><tr><th>Timestamp</th><th>Description</th><th>Size</th><th>Created</th><th></th></tr></thead><tbody>"#);
        for b in backups {
            let ts = escape_html(&b.timestamp);
            content.push_str("<tr><td><code>");
            content.push_str(&ts);
            content.push_str("</code></td><td>");
            content.push_str(&escape_html(&b.description));
            content.push_str("</td><td>");
            content.push_str(&format_size(b.size));
            content.push_str("</td><td>");
            content.push_str(&b.created.format("%Y-%m-%d %H:%M:%S").to_string());
            content.push_str(r#"</td><td class="actions"><a class="btn btn-secondary btn-sm" href="/backup/"#);
            content.push_str(&ts);
            content.push_str(r#"/download">Download</a> <button class="btn btn-secondary btn-sm" data-ts=""#);
            content.push_str(&ts);
            content.push_str(r#"" onclick="restoreBackup(this)">Restore</button> <button class="btn btn-danger btn-sm" data-ts=""#);
            content.push_str(&ts);
            content.push_str(r#"" onclick="deleteBackup(this)">Delete</button></td></tr>"#);
        }
        content.push_str("</tbody></table>");
    }
    content.push_str(r#"</div><div id="result"></div>"#);
    content.push_str(BACKUP_SCRIPT);
    app_shell("Backups", "backup", &content)
}

pub fn logs_page(logs: &str) -> String {
    let mut content = String::with_capacity(logs.len() + 512);
    content.push_str(r#"<div class="card"><div class="card-header"><span class="card-title">docker compose logs</span><a class="btn btn-secondary btn-sm" href="/logs/download">Download</a></div><div class="card-body"><pre class="code-block">"#);
    content.push_str(&escape_html(logs));
    content.push_str("</pre></div></div>");
    app_shell("Logs", "logs", &content)
}

/// `users` is the list, or the error text if it could not be loaded.
pub fn keycloak_page(
    username: &str,
    users: Result<&[KeycloakUser], &str>,
    flashes: &[Flash],
) -> String {
    let mut content = String::with_capacity(4096);
    push_flashes(&mut content, flashes);
    content.push_str(r#"<div class="card"><div class="card-header"><span class="card-title">Add user</span></div><div class="card-body"><form method="post" action="/keycloak/add-user"><div class="form-group"><label class="form-label" for="username">Username</label><input class="form-input" id="username" name="username" required value=""#);
    content.push_str(&escape_html(username));
    content.push_str(r#""/></div><div class="form-group"><label class="form-label" for="password">Password</label><input class="form-input" id="password" name="password" type="password" required/></div><button class="btn btn-primary" type="submit">Create user</button></form></div></div>"#);

    content.push_str(r#"<div class="card"><div class="card-header"><span class="card-title">Current users</span></div>"#);
    match users {
        Err(e) => {
            content.push_str(r#"<div class="card-body"><p class="flash flash-error">Failed to load current users: "#);
            content.push_str(&escape_html(e));
            content.push_str("</p></div>");
        }
        Ok([]) => content.push_str(r#"<div class="card-body"><p class="muted">No users.</p></div>"#),
        Ok(users) => {
            content.push_str(r#"<table class="table"><thead><tr><th>Username</th><th>Email</th><th>Enabled</th></tr></thead><tbody>"#);
            for u in users {
                content.push_str("<tr><td>");
                content.push_str(&escape_html(&u.username));
                content.push_str("</td><td>");
                content.push_str(&escape_html(u.email.as_deref().unwrap_or("")));
                content.push_str("</td><td>");
                content.push_str(match u.enabled {
                    Some(true) => "yes",
                    Some(false) => "no",
                    None => "",
                });
                content.push_str("</td></tr>");
            }
            content.push_str("</tbody></table>");
        }
    }
    content.push_str("</div>");
    app_shell("Identity provider users", "keycloak", &content)
}

pub fn login_page(next: &str, flashes: &[Flash]) -> String {
    let mut content = String::with_capacity(2048);
    content.push_str(r#"<div class="card login"><div class="card-body"><h3>Sign in</h3>"#);
    push_flashes(&mut content, flashes);
    content.push_str(r#"<form method="post" action="/login"><input type="hidden" name="next_url" value=""#);
    content.push_str(&escape_html(next));
    content.push_str(r#""/><div class="form-group"><label class="form-label" for="username">Username</label><input class="form-input" id="username" name="username" autocomplete="username" required/></div><div class="form-group"><label class="form-label" for="password">Password</label><input class="form-input" id="password" name="password" type="password" autocomplete="current-password" required/></div><button class="btn btn-primary" type="submit">Sign in</button></form></div></div>"#);
    login_shell(&content)
}

fn push_flashes(html: &mut String, flashes: &[Flash]) {
    for flash in flashes {
        html.push_str(match flash.kind {
            FlashKind::Success => r#"<p class="flash flash-success">"#,
            FlashKind::Error => r#"<p class="flash flash-error">"#,
        });
        html.push_str(&escape_html(&flash.text));
        html.push_str("</p>");
    }
}

// ── Shells ───────────────────────────────────────────────────────────

/// Standalone page without navigation.
fn login_shell(content: &str) -> String {
    let mut html = String::with_capacity(content.len() + 4096);
    html.push_str(APP_CSS);
    html.push_str("<body class=\"centered\">\n");
    html.push_str(content);
    html.push_str("\n</body>\n</html>");
    html
}

/// Setup wizard pages: no maintenance navigation yet.
fn setup_shell(title: &str, content: &str) -> String {
    let mut html = String::with_capacity(content.len() + 4096);
    html.push_str(APP_CSS);
    html.push_str("<body>\n<header class=\"topbar\"><div class=\"topbar-title\">");
    html.push_str(title);
    html.push_str("</div></header><main class=\"content wizard\">");
    html.push_str(content);
    html.push_str("</main>\n</body>\n</html>");
    html
}

/// Page with the maintenance navigation.
fn app_shell(title: &str, active: &str, content: &str) -> String {
    let nav_item = |href: &str, id: &str, label: &str| -> String {
        let class = if active == id { "nav-link active" } else { "nav-link" };
        let mut s = String::with_capacity(96);
        s.push_str("<a href=\"");
        s.push_str(href);
        s.push_str("\" class=\"");
        s.push_str(class);
        s.push_str("\">");
        s.push_str(label);
        s.push_str("</a>");
        s
    };

    let mut html = String::with_capacity(content.len() + 8192);
    html.push_str(APP_CSS);
    html.push_str("<body>\n<header class=\"topbar\"><div class=\"topbar-title\">");
    html.push_str(title);
    html.push_str("</div><nav>");
    html.push_str(&nav_item("/", "setup", "Setup"));
    html.push_str(&nav_item("/versions", "versions", "Versions"));
    html.push_str(&nav_item("/backup", "backup", "Backups"));
    html.push_str(&nav_item("/logs", "logs", "Logs"));
    html.push_str(&nav_item("/keycloak/add-user", "keycloak", "Users"));
    html.push_str(r#"<a href="/logout" class="nav-link danger">Sign out</a></nav></header><main class="content">"#);
    html.push_str(content);
    html.push_str("</main>\n</body>\n</html>");
    html
}

const SETUP_FORM: &str = r##"<div class="card"><div class="card-body">
<p class="muted">Enter the public domains of the stack and the first administrator account. Optionally upload a backup archive to restore during setup.</p>
<form method="post" action="/" enctype="multipart/form-data">
<input type="hidden" name="step" value="generate_env"/>
<div class="form-group"><label class="form-label" for="DOMAIN">Domain</label><input class="form-input" id="DOMAIN" name="DOMAIN" placeholder="app.example.com" required/></div>
<div class="form-group"><label class="form-label" for="AUTH_DOMAIN">Auth domain</label><input class="form-input" id="AUTH_DOMAIN" name="AUTH_DOMAIN" placeholder="auth.example.com" required/></div>
<div class="form-group"><label class="form-label" for="ADMIN_USERNAME">Admin username</label><input class="form-input" id="ADMIN_USERNAME" name="ADMIN_USERNAME" required/></div>
<div class="form-group"><label class="form-label" for="ADMIN_PASSWORD">Admin password</label><input class="form-input" id="ADMIN_PASSWORD" name="ADMIN_PASSWORD" type="password" required/></div>
<div class="form-group"><label class="form-label" for="backup_file">Backup archive</label><input class="form-input" id="backup_file" name="backup_file" type="file" accept=".zip"/><div class="form-hint">Leave empty for a fresh installation.</div></div>
<button class="btn btn-primary" type="submit">Start setup</button>
</form></div></div>"##;

const VERSIONS_SCRIPT: &str = r##"
<script>
function showResult(ok,msg){var r=document.getElementById('result');r.className='flash '+(ok?'flash-success':'flash-error');r.textContent=msg}
function updateVersions(btn){
  if(!confirm('Update all components and restart the stack?'))return;
  btn.disabled=true;btn.textContent='Updating...';
  fetch('/versions',{method:'PUT'}).then(function(r){return r.json()}).then(function(d){
    showResult(d.success,d.message);if(d.success)setTimeout(function(){location.reload()},1500)
  }).catch(function(e){showResult(false,String(e))}).finally(function(){btn.disabled=false;btn.textContent='Update all'});
}
</script>
"##;

const BACKUP_SCRIPT: &str = r##"
<script>
function showResult(ok,msg){var r=document.getElementById('result');r.className='flash '+(ok?'flash-success':'flash-error');r.textContent=msg}
function call(method,url,body){
  var opts={method:method,headers:{'Content-Type':'application/json'}};
  if(body)opts.body=JSON.stringify(body);
  return fetch(url,opts).then(function(r){return r.json()}).then(function(d){
    showResult(d.success,d.message);if(d.success)setTimeout(function(){location.reload()},1000)
  }).catch(function(e){showResult(false,String(e))});
}
function createBackup(btn){btn.disabled=true;call('POST','/backup',{description:document.getElementById('description').value}).finally(function(){btn.disabled=false})}
function deleteBackup(btn){var ts=btn.dataset.ts;if(confirm('Delete backup '+ts+'?'))call('DELETE','/backup',{timestamp:ts})}
function restoreBackup(btn){var ts=btn.dataset.ts;if(!confirm('Restore backup '+ts+'? Containers will be stopped.'))return;btn.disabled=true;call('POST','/backup/'+encodeURIComponent(ts)+'/restore').finally(function(){btn.disabled=false})}
</script>
"##;

const APP_CSS: &str = r##"<!DOCTYPE html>
<html lang="en"><head><meta charset="utf-8"/><meta name="viewport" content="width=device-width,initial-scale=1"/><title>stackadm</title>
<style>
*,*::before,*::after{box-sizing:border-box;margin:0;padding:0}
:root{
  --bg:#F6F4EF;--surface:#FFFFFF;--border:#E4DFD3;--text:#2D1F0E;--muted:#7A6543;
  --primary:#E8A817;--primary-hover:#D49A0F;--danger:#E74C3C;--success:#4CAF50;--warning:#F5A623;--info:#5B9BD5;
  --radius:12px;--mono:'JetBrains Mono','SF Mono',Monaco,Consolas,monospace;
  --font:-apple-system,BlinkMacSystemFont,'Segoe UI',sans-serif
}
body{font-family:var(--font);background:var(--bg);color:var(--text);line-height:1.6;min-height:100vh}
body.centered{display:flex;align-items:center;justify-content:center}
.topbar{display:flex;align-items:center;justify-content:space-between;padding:16px 32px;background:var(--surface);border-bottom:1px solid var(--border)}
.topbar-title{font-size:20px;font-weight:800}
nav{display:flex;gap:6px;flex-wrap:wrap}
.nav-link{padding:6px 14px;border-radius:50px;color:var(--muted);text-decoration:none;font-size:13px;font-weight:600}
.nav-link.active{background:rgba(232,168,23,.18);color:var(--text)}
.nav-link.danger{color:var(--danger)}
.content{padding:28px 32px}
.wizard{max-width:720px;margin:0 auto}
.card{background:var(--surface);border:1px solid var(--border);border-radius:var(--radius);margin-bottom:20px;overflow:hidden}
.card.login{width:380px}
.card-header{display:flex;align-items:center;justify-content:space-between;padding:14px 20px;border-bottom:1px solid var(--border)}
.card-title{font-size:15px;font-weight:700}
.card-body{padding:20px}
.card-body h3{margin-bottom:12px}.card-body h4{margin:16px 0 8px}
.table{width:100%;border-collapse:collapse;font-size:13px}
.table th{text-align:left;color:var(--muted);font-size:11px;text-transform:uppercase;letter-spacing:.6px;padding:10px 16px;border-bottom:1px solid var(--border)}
.table td{padding:11px 16px;border-bottom:1px solid var(--border)}
.table tr:last-child td{border-bottom:none}
.actions{white-space:nowrap}
.badge{display:inline-block;padding:3px 10px;border-radius:50px;font-size:11px;font-weight:700}
.badge-success{background:rgba(76,175,80,.12);color:#2E7D32}
.badge-warning{background:rgba(245,166,35,.14);color:#E65100}
.badge-danger{background:rgba(231,76,60,.1);color:#C62828}
.badge-info{background:rgba(91,155,213,.12);color:#1565C0}
.btn{display:inline-flex;align-items:center;padding:9px 18px;border-radius:50px;font-size:13px;font-weight:600;text-decoration:none;border:none;cursor:pointer}
.btn-primary{background:var(--primary);color:#2D1F0E}.btn-primary:hover{background:var(--primary-hover)}
.btn-secondary{background:transparent;color:var(--text);border:1px solid var(--border)}
.btn-danger{background:var(--danger);color:#fff}
.btn-sm{padding:5px 12px;font-size:12px}
.btn:disabled{opacity:.5;cursor:default}
.form-group{margin-bottom:16px}
.form-label{display:block;font-size:13px;font-weight:700;margin-bottom:6px}
.form-input{width:100%;padding:10px 14px;border:1px solid var(--border);border-radius:8px;font-size:13px;font-family:var(--font)}
.form-input:focus{outline:none;border-color:var(--primary)}
.form-hint,.muted{font-size:12px;color:var(--muted)}
.flash{padding:10px 14px;border-radius:8px;margin-bottom:16px;font-size:13px}
.flash-success{background:rgba(76,175,80,.12);color:#2E7D32}
.flash-error{background:rgba(231,76,60,.1);color:#C62828}
.steps{margin:12px 0 12px 20px;font-size:13px;color:var(--muted)}
.steps li.current{color:var(--text);font-weight:700}
.code-block{background:#1E1610;color:#E8D5A3;padding:16px;border-radius:8px;font-family:var(--mono);font-size:12px;overflow:auto;max-height:60vh;white-space:pre-wrap;word-break:break-all}
code{font-family:var(--mono);font-size:12px;background:rgba(232,168,23,.12);padding:1px 6px;border-radius:4px}
</style></head>
"##;
