//! Application Shell
//!
//! An [`App`] owns a root component and the context shared by every
//! component it renders: app-level provides, named components and the set
//! of installed plugins.
//!
//! ```rust
//! use std::rc::Rc;
//! use weft_core::prelude::*;
//!
//! let host = Rc::new(MemoryHost::new());
//! let renderer = Renderer::new(Runtime::new(), host.clone());
//! let root = host.create_root();
//!
//! let hello = Rc::new(ComponentDef::new("Hello").with_render(|_| text("hello")));
//! let app = renderer.create_app(hello);
//! app.mount(root).unwrap();
//! assert_eq!(host.text_content(root), "hello");
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::reactive::Value;
use crate::render::component::{ComponentDef, ComponentInstance};
use crate::render::host::NodeId;
use crate::render::vnode::{create_vnode_with, Children, Props, VNodeType};
use crate::render::Renderer;

/// Something that extends an [`App`] when installed.
pub trait Plugin {
    fn install(&self, app: &App, options: &[Value]);
}

impl<F: Fn(&App, &[Value])> Plugin for F {
    fn install(&self, app: &App, options: &[Value]) {
        self(app, options)
    }
}

/// State shared by every component of one application.
#[derive(Default)]
pub struct AppContext {
    provides: RefCell<IndexMap<String, Value>>,
    components: RefCell<IndexMap<String, Rc<ComponentDef>>>,
    plugins: RefCell<Vec<Rc<dyn Plugin>>>,
}

impl AppContext {
    /// A value provided at application level.
    pub fn provided(&self, key: &str) -> Option<Value> {
        self.provides.borrow().get(key).cloned()
    }

    /// A component registered by name.
    pub fn component(&self, name: &str) -> Option<Rc<ComponentDef>> {
        self.components.borrow().get(name).cloned()
    }

    pub fn plugin_count(&self) -> usize {
        self.plugins.borrow().len()
    }
}

impl fmt::Debug for AppContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppContext")
            .field("provides", &self.provides.borrow().keys().collect::<Vec<_>>())
            .field("components", &self.components.borrow().keys().collect::<Vec<_>>())
            .field("plugins", &self.plugins.borrow().len())
            .finish()
    }
}

/// An application: a root component bound to a renderer.
pub struct App {
    renderer: Renderer,
    root: Rc<ComponentDef>,
    root_props: Rc<Props>,
    context: Rc<AppContext>,
    container: Cell<Option<NodeId>>,
}

impl App {
    fn new(renderer: Renderer, root: Rc<ComponentDef>) -> Self {
        Self {
            renderer,
            root,
            root_props: Rc::new(Props::new()),
            context: Rc::new(AppContext::default()),
            container: Cell::new(None),
        }
    }

    /// Props passed to the root component.
    pub fn with_props(mut self, props: Props) -> Self {
        self.root_props = Rc::new(props);
        self
    }

    pub fn context(&self) -> &Rc<AppContext> {
        &self.context
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    /// Render the root component into `container`.
    pub fn mount(&self, container: NodeId) -> Result<()> {
        if self.container.get().is_some() {
            return Err(Error::AlreadyMounted);
        }

        let vnode = create_vnode_with(
            VNodeType::Component(Rc::clone(&self.root)),
            Rc::clone(&self.root_props),
            Children::None,
        );
        *vnode.app_context.borrow_mut() = Some(Rc::clone(&self.context));

        debug!(component = self.root.name(), container = container.raw(), "mounting app");
        self.renderer.render(Some(vnode), container);
        self.container.set(Some(container));
        Ok(())
    }

    /// Unmount the root component.
    pub fn unmount(&self) -> Result<()> {
        let container = self.container.take().ok_or(Error::NotMounted)?;
        debug!(component = self.root.name(), container = container.raw(), "unmounting app");
        self.renderer.render(None, container);
        Ok(())
    }

    pub fn is_mounted(&self) -> bool {
        self.container.get().is_some()
    }

    /// The root component instance, while mounted.
    pub fn root_instance(&self) -> Option<Rc<ComponentInstance>> {
        let container = self.container.get()?;
        self.renderer.root(container)?.component()
    }

    /// Install `plugin`. Installing the same plugin twice is a no-op.
    pub fn use_plugin(&self, plugin: Rc<dyn Plugin>, options: &[Value]) -> &Self {
        let installed = self
            .context
            .plugins
            .borrow()
            .iter()
            .any(|existing| std::ptr::addr_eq(Rc::as_ptr(existing), Rc::as_ptr(&plugin)));
        if installed {
            warn!("plugin has already been installed");
            return self;
        }

        self.context.plugins.borrow_mut().push(Rc::clone(&plugin));
        plugin.install(self, options);
        self
    }

    /// Provide `value` to every component of the application.
    pub fn provide(&self, key: impl Into<String>, value: impl Into<Value>) -> &Self {
        self.context.provides.borrow_mut().insert(key.into(), value.into());
        self
    }

    /// Register `def` under `name`.
    pub fn component(&self, name: impl Into<String>, def: Rc<ComponentDef>) -> &Self {
        self.context.components.borrow_mut().insert(name.into(), def);
        self
    }

    pub fn resolve_component(&self, name: &str) -> Option<Rc<ComponentDef>> {
        self.context.component(name)
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("root", &self.root.name())
            .field("container", &self.container.get())
            .field("context", &self.context)
            .finish()
    }
}

impl Renderer {
    /// Create an application rendering `root` through this renderer.
    pub fn create_app(&self, root: Rc<ComponentDef>) -> App {
        App::new(self.clone(), root)
    }
}
