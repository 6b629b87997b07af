//! Components
//!
//! A [`ComponentDef`] describes a component: an optional `setup` function
//! that runs once per instance and a render function that produces the
//! instance's subtree. Mounting a component vnode creates a
//! [`ComponentInstance`].
//!
//! # Lifecycle
//!
//! 1. `setup` runs with the instance as the current instance, so lifecycle
//!    hooks and `provide`/`inject` called from it attach to that instance.
//!
//! 2. The instance's update is a lazy effect. Its first run renders the
//!    subtree and mounts it; reads made while rendering are tracked.
//!
//! 3. When a tracked value changes, the effect does not re-render on the
//!    spot. Its scheduler queues the instance's job, ordered by instance
//!    uid so parents update before their children.
//!
//! 4. A parent re-render that produces new props for the child updates the
//!    child synchronously and drops its queued job. Identical props skip
//!    the child entirely.
//!
//! 5. Unmounting stops the effect, drops any queued job and unmounts the
//!    subtree.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use tracing::{debug, warn};

use super::host::{handler_name, NodeId};
use super::renderer::{Renderer, RendererInner};
use super::vnode::{comment, Children, Props, VNode, VNodeRef, VNodeType};
use crate::app::AppContext;
use crate::reactive::{Effect, EffectOptions, Runtime, Value};
use crate::scheduler::Job;

/// Render function of a component.
pub type RenderFn = dyn Fn(&RenderContext<'_>) -> VNodeRef;

/// Setup function of a component. Receives a snapshot of the props.
pub type SetupFn = dyn Fn(&Props, &SetupContext<'_>) -> SetupResult;

type Hook = Rc<dyn Fn()>;

/// What `setup` hands back.
pub enum SetupResult {
    /// Nothing; the definition's render function is used.
    None,
    /// State exposed to the render function through [`RenderContext::get`].
    State(Props),
    /// A render function that replaces the definition's.
    Render(Rc<RenderFn>),
}

impl SetupResult {
    pub fn render(render: impl Fn(&RenderContext<'_>) -> VNodeRef + 'static) -> Self {
        SetupResult::Render(Rc::new(render))
    }
}

/// A component definition.
///
/// ```rust
/// use weft_core::prelude::*;
///
/// let greeting = ComponentDef::new("Greeting").with_render(|ctx| {
///     let name = ctx.get("name").unwrap_or_default();
///     h("p", Props::new(), format!("hello {name}"))
/// });
/// assert_eq!(greeting.name(), "Greeting");
/// ```
pub struct ComponentDef {
    name: String,
    setup: Option<Box<SetupFn>>,
    render: Option<Rc<RenderFn>>,
    scope_id: Option<String>,
    functional: bool,
}

impl ComponentDef {
    /// A stateful component with no setup and no render function yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            setup: None,
            render: None,
            scope_id: None,
            functional: false,
        }
    }

    /// A component that is just a render function of its props.
    pub fn functional(
        name: impl Into<String>,
        render: impl Fn(&RenderContext<'_>) -> VNodeRef + 'static,
    ) -> Self {
        Self {
            functional: true,
            ..Self::new(name).with_render(render)
        }
    }

    pub fn with_setup(
        mut self,
        setup: impl Fn(&Props, &SetupContext<'_>) -> SetupResult + 'static,
    ) -> Self {
        self.setup = Some(Box::new(setup));
        self
    }

    pub fn with_render(
        mut self,
        render: impl Fn(&RenderContext<'_>) -> VNodeRef + 'static,
    ) -> Self {
        self.render = Some(Rc::new(render));
        self
    }

    /// Scope id applied to every element this component renders.
    pub fn with_scope_id(mut self, scope_id: impl Into<String>) -> Self {
        self.scope_id = Some(scope_id.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope_id(&self) -> Option<&str> {
        self.scope_id.as_deref()
    }

    pub fn is_functional(&self) -> bool {
        self.functional
    }
}

impl fmt::Debug for ComponentDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDef")
            .field("name", &self.name)
            .field("functional", &self.functional)
            .field("has_setup", &self.setup.is_some())
            .finish()
    }
}

#[derive(Default)]
struct LifecycleHooks {
    mounted: Vec<Hook>,
    updated: Vec<Hook>,
    unmounted: Vec<Hook>,
}

/// A mounted component.
pub struct ComponentInstance {
    uid: u64,
    def: Rc<ComponentDef>,

    /// The vnode currently representing this instance in its parent's tree.
    vnode: RefCell<Weak<VNode>>,

    props: RefCell<Rc<Props>>,
    slots: RefCell<Children>,
    setup_state: RefCell<Rc<Props>>,
    render: RefCell<Option<Rc<RenderFn>>>,
    sub_tree: RefCell<Option<VNodeRef>>,

    is_mounted: Cell<bool>,
    is_unmounted: Cell<bool>,
    render_count: Cell<usize>,

    update: RefCell<Option<Effect>>,
    job: Job,

    /// Replacement vnode from a parent-driven update, adopted on the next
    /// render.
    next: RefCell<Option<VNodeRef>>,

    container: Cell<Option<NodeId>>,
    anchor: Cell<Option<NodeId>>,

    parent: Option<Weak<ComponentInstance>>,
    app_context: Option<Rc<AppContext>>,
    provides: RefCell<IndexMap<String, Value>>,
    hooks: RefCell<LifecycleHooks>,

    runtime: Runtime,
}

impl ComponentInstance {
    fn new(
        def: Rc<ComponentDef>,
        vnode: &VNodeRef,
        parent: Option<&Rc<ComponentInstance>>,
        runtime: &Runtime,
    ) -> Rc<Self> {
        static NEXT_UID: AtomicU64 = AtomicU64::new(1);
        let uid = NEXT_UID.fetch_add(1, Ordering::Relaxed);

        let app_context = parent
            .and_then(|parent| parent.app_context.clone())
            .or_else(|| vnode.app_context.borrow().clone());

        Rc::new_cyclic(|this: &Weak<ComponentInstance>| {
            let this = this.clone();
            let job = Job::with_id(uid, move || {
                if let Some(instance) = this.upgrade() {
                    instance.run_update();
                }
            });

            Self {
                uid,
                render: RefCell::new(def.render.clone()),
                def,
                vnode: RefCell::new(Rc::downgrade(vnode)),
                props: RefCell::new(Rc::clone(&vnode.props)),
                slots: RefCell::new(vnode.children.clone()),
                setup_state: RefCell::new(Rc::new(Props::new())),
                sub_tree: RefCell::new(None),
                is_mounted: Cell::new(false),
                is_unmounted: Cell::new(false),
                render_count: Cell::new(0),
                update: RefCell::new(None),
                job,
                next: RefCell::new(None),
                container: Cell::new(None),
                anchor: Cell::new(None),
                parent: parent.map(Rc::downgrade),
                app_context,
                provides: RefCell::new(IndexMap::new()),
                hooks: RefCell::new(LifecycleHooks::default()),
                runtime: runtime.clone(),
            }
        })
    }

    pub fn uid(&self) -> u64 {
        self.uid
    }

    pub fn def(&self) -> &Rc<ComponentDef> {
        &self.def
    }

    pub fn name(&self) -> &str {
        self.def.name()
    }

    /// Current props.
    pub fn props(&self) -> Rc<Props> {
        Rc::clone(&self.props.borrow())
    }

    pub fn slots(&self) -> Children {
        self.slots.borrow().clone()
    }

    pub fn vnode(&self) -> Option<VNodeRef> {
        self.vnode.borrow().upgrade()
    }

    /// Root of the rendered subtree, once mounted.
    pub fn sub_tree(&self) -> Option<VNodeRef> {
        self.sub_tree.borrow().clone()
    }

    pub fn parent(&self) -> Option<Rc<ComponentInstance>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn app_context(&self) -> Option<&Rc<AppContext>> {
        self.app_context.as_ref()
    }

    pub fn is_mounted(&self) -> bool {
        self.is_mounted.get()
    }

    pub fn is_unmounted(&self) -> bool {
        self.is_unmounted.get()
    }

    /// Number of times the render function has run.
    pub fn render_count(&self) -> usize {
        self.render_count.get()
    }

    /// The job that re-renders this instance.
    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Call the `on<Event>` handler prop, if the parent passed one.
    pub fn emit(&self, event: &str, args: &[Value]) -> bool {
        let handler = self
            .props
            .borrow()
            .get(&handler_name(event))
            .and_then(|value| value.as_handler().cloned());
        match handler {
            Some(handler) => {
                handler.call(args);
                true
            }
            None => false,
        }
    }

    /// Re-render now. Runs the updated hooks once the render effect has
    /// finished.
    fn run_update(&self) {
        let effect = self.update.borrow().clone();
        let Some(effect) = effect else {
            return;
        };
        let renders = self.render_count.get();
        effect.run();
        if self.render_count.get() > renders && !self.is_unmounted.get() {
            self.call_hooks(|hooks| &hooks.updated);
        }
    }

    fn render_root(&self) -> VNodeRef {
        let render = self.render.borrow().clone();
        self.render_count.set(self.render_count.get() + 1);
        match render {
            Some(render) => render(&RenderContext { instance: self }),
            None => {
                warn!(component = self.def.name(), "component has no render function");
                comment("")
            }
        }
    }

    fn call_hooks(&self, select: impl Fn(&LifecycleHooks) -> &Vec<Hook>) {
        let hooks = select(&*self.hooks.borrow()).clone();
        if hooks.is_empty() {
            return;
        }
        self.runtime.untracked(|| {
            for hook in hooks {
                hook();
            }
        });
    }
}

impl fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("uid", &self.uid)
            .field("name", &self.def.name())
            .field("is_mounted", &self.is_mounted.get())
            .field("render_count", &self.render_count.get())
            .finish()
    }
}

/// Passed to `setup`.
pub struct SetupContext<'a> {
    instance: &'a Rc<ComponentInstance>,
}

impl SetupContext<'_> {
    /// All props passed to the component.
    pub fn attrs(&self) -> Rc<Props> {
        self.instance.props()
    }

    /// Children passed to the component vnode.
    pub fn slots(&self) -> Children {
        self.instance.slots()
    }

    pub fn emit(&self, event: &str, args: &[Value]) -> bool {
        self.instance.emit(event, args)
    }

    pub fn runtime(&self) -> &Runtime {
        &self.instance.runtime
    }

    pub fn instance(&self) -> &Rc<ComponentInstance> {
        self.instance
    }
}

/// Passed to render functions.
pub struct RenderContext<'a> {
    instance: &'a ComponentInstance,
}

impl RenderContext<'_> {
    /// Look up `key` in the setup state, then in the props.
    pub fn get(&self, key: &str) -> Option<Value> {
        let state = self.instance.setup_state.borrow().get(key).cloned();
        state.or_else(|| self.prop(key))
    }

    pub fn prop(&self, key: &str) -> Option<Value> {
        self.instance.props.borrow().get(key).cloned()
    }

    pub fn props(&self) -> Rc<Props> {
        self.instance.props()
    }

    pub fn slots(&self) -> Children {
        self.instance.slots()
    }

    pub fn emit(&self, event: &str, args: &[Value]) -> bool {
        self.instance.emit(event, args)
    }

    /// A component registered on the application by name.
    pub fn resolve_component(&self, name: &str) -> Option<Rc<ComponentDef>> {
        self.instance.app_context.as_ref()?.component(name)
    }

    pub fn runtime(&self) -> &Runtime {
        &self.instance.runtime
    }

    pub fn instance(&self) -> &ComponentInstance {
        self.instance
    }
}

// ----------------------------------------------------------------------------
// Mounting and updating
// ----------------------------------------------------------------------------

impl Renderer {
    pub(crate) fn process_component(
        &self,
        old: Option<&VNodeRef>,
        new: &VNodeRef,
        container: NodeId,
        anchor: Option<NodeId>,
        parent: Option<&Rc<ComponentInstance>>,
    ) {
        match old {
            None => self.mount_component(new, container, anchor, parent),
            Some(old) => self.update_component(old, new),
        }
    }

    fn mount_component(
        &self,
        vnode: &VNodeRef,
        container: NodeId,
        anchor: Option<NodeId>,
        parent: Option<&Rc<ComponentInstance>>,
    ) {
        let VNodeType::Component(def) = &vnode.node_type else {
            return;
        };
        let runtime = self.runtime();
        let instance = ComponentInstance::new(Rc::clone(def), vnode, parent, runtime);
        *vnode.component.borrow_mut() = Some(Rc::clone(&instance));
        instance.container.set(Some(container));
        instance.anchor.set(anchor);

        debug!(component = def.name(), uid = instance.uid, "mounting component");

        if let Some(setup) = &def.setup {
            let result = {
                let _current = runtime.enter_instance(Rc::clone(&instance));
                let props = instance.props();
                runtime.untracked(|| setup(&*props, &SetupContext { instance: &instance }))
            };
            match result {
                SetupResult::None => {}
                SetupResult::State(state) => *instance.setup_state.borrow_mut() = Rc::new(state),
                SetupResult::Render(render) => *instance.render.borrow_mut() = Some(render),
            }
        }

        self.setup_render_effect(&instance);
    }

    fn setup_render_effect(&self, instance: &Rc<ComponentInstance>) {
        let runtime = self.runtime().clone();
        let job = instance.job.clone();

        let update = {
            let instance = Rc::downgrade(instance);
            let renderer: Weak<RendererInner> = Rc::downgrade(&self.inner);
            move || {
                let (Some(instance), Some(inner)) = (instance.upgrade(), renderer.upgrade()) else {
                    return;
                };
                Renderer::from_inner(inner).run_component_update(&instance);
            }
        };

        let effect = {
            let rt = runtime.clone();
            runtime.effect_with(
                update,
                EffectOptions::default()
                    .lazy()
                    .with_scheduler(move || rt.queue_job(job.clone())),
            )
        };
        *instance.update.borrow_mut() = Some(effect.clone());
        effect.run();

        // Hooks run outside the render effect so writes they make can
        // schedule a re-render.
        if instance.is_mounted.get() {
            instance.call_hooks(|hooks| &hooks.mounted);
        }
    }

    fn run_component_update(&self, instance: &Rc<ComponentInstance>) {
        if instance.is_unmounted.get() {
            return;
        }

        if !instance.is_mounted.get() {
            let tree = instance.render_root();
            let Some(container) = instance.container.get() else {
                return;
            };
            self.patch_node(None, &tree, container, instance.anchor.get(), Some(instance));
            if let Some(vnode) = instance.vnode() {
                vnode.el.set(tree.el.get());
            }
            *instance.sub_tree.borrow_mut() = Some(tree);
            instance.is_mounted.set(true);
            debug!(component = instance.name(), uid = instance.uid, "mounted component");
            return;
        }

        let next = instance.next.borrow_mut().take();
        if let Some(next) = next {
            if let Some(prev) = instance.vnode() {
                next.el.set(prev.el.get());
            }
            *instance.props.borrow_mut() = Rc::clone(&next.props);
            *instance.slots.borrow_mut() = next.children.clone();
            *instance.vnode.borrow_mut() = Rc::downgrade(&next);
        }

        let next_tree = instance.render_root();
        let Some(prev_tree) = instance.sub_tree.borrow_mut().take() else {
            return;
        };

        let container = prev_tree
            .el
            .get()
            .and_then(|el| self.host().parent_node(el))
            .or(instance.container.get());
        let Some(container) = container else {
            return;
        };
        let anchor = self.next_host_node(&prev_tree);

        self.patch_node(Some(&prev_tree), &next_tree, container, anchor, Some(instance));
        update_host_el(instance, next_tree.el.get());
        *instance.sub_tree.borrow_mut() = Some(next_tree);
    }

    fn update_component(&self, old: &VNodeRef, new: &VNodeRef) {
        let Some(instance) = old.component() else {
            return;
        };
        *new.component.borrow_mut() = Some(Rc::clone(&instance));

        if should_update_component(old, new) {
            *instance.next.borrow_mut() = Some(Rc::clone(new));
            // The synchronous update below makes a queued one redundant.
            self.runtime().invalidate_job(&instance.job);
            instance.run_update();
        } else {
            new.el.set(old.el.get());
            *instance.vnode.borrow_mut() = Rc::downgrade(new);
        }
    }

    pub(crate) fn unmount_component(&self, instance: &Rc<ComponentInstance>, remove: bool) {
        if instance.is_unmounted.replace(true) {
            return;
        }
        debug!(component = instance.name(), uid = instance.uid, "unmounting component");

        let effect = instance.update.borrow_mut().take();
        if let Some(effect) = effect {
            effect.stop();
        }
        self.runtime().invalidate_job(&instance.job);

        let sub_tree = instance.sub_tree.borrow_mut().take();
        if let Some(sub_tree) = sub_tree {
            self.unmount_node(&sub_tree, Some(instance), remove);
        }
        instance.is_mounted.set(false);
        instance.call_hooks(|hooks| &hooks.unmounted);
    }
}

/// Point the vnode of `instance` at `el`, and the vnodes of every ancestor
/// whose subtree root is that vnode.
fn update_host_el(instance: &Rc<ComponentInstance>, el: Option<NodeId>) {
    let mut current = Rc::clone(instance);
    loop {
        let Some(vnode) = current.vnode() else {
            return;
        };
        vnode.el.set(el);

        let Some(parent) = current.parent() else {
            return;
        };
        let is_root = parent.sub_tree().is_some_and(|tree| Rc::ptr_eq(&tree, &vnode));
        if !is_root {
            return;
        }
        current = parent;
    }
}

/// Parent-driven updates re-render the child unless it was handed the very
/// same props and no slots.
fn should_update_component(old: &VNode, new: &VNode) -> bool {
    if !matches!(new.children, Children::None) || !matches!(old.children, Children::None) {
        return true;
    }
    !Rc::ptr_eq(&old.props, &new.props)
}

// ----------------------------------------------------------------------------
// Hooks and dependency injection
// ----------------------------------------------------------------------------

impl Runtime {
    fn register_hook(
        &self,
        kind: &'static str,
        hook: Hook,
        select: impl Fn(&mut LifecycleHooks) -> &mut Vec<Hook>,
    ) {
        match self.current_instance() {
            Some(instance) => select(&mut *instance.hooks.borrow_mut()).push(hook),
            None => warn!(hook = kind, "lifecycle hook registered outside of setup is ignored"),
        }
    }

    /// Run `hook` after the current component's first mount.
    pub fn on_mounted(&self, hook: impl Fn() + 'static) {
        self.register_hook("mounted", Rc::new(hook), |hooks| &mut hooks.mounted);
    }

    /// Run `hook` after every re-render of the current component.
    pub fn on_updated(&self, hook: impl Fn() + 'static) {
        self.register_hook("updated", Rc::new(hook), |hooks| &mut hooks.updated);
    }

    /// Run `hook` when the current component is unmounted.
    pub fn on_unmounted(&self, hook: impl Fn() + 'static) {
        self.register_hook("unmounted", Rc::new(hook), |hooks| &mut hooks.unmounted);
    }

    /// Make `value` available to descendants of the current component.
    pub fn provide(&self, key: impl Into<String>, value: impl Into<Value>) {
        match self.current_instance() {
            Some(instance) => {
                instance.provides.borrow_mut().insert(key.into(), value.into());
            }
            None => warn!("provide called outside of setup is ignored"),
        }
    }

    /// Look `key` up in the ancestors of the current component, then in the
    /// application.
    pub fn inject(&self, key: &str) -> Option<Value> {
        let instance = self.current_instance()?;

        let mut cursor = instance.parent();
        while let Some(ancestor) = cursor {
            if let Some(value) = ancestor.provides.borrow().get(key) {
                return Some(value.clone());
            }
            cursor = ancestor.parent();
        }

        instance.app_context.as_ref()?.provided(key)
    }
}
