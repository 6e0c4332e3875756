// Copyright (C) 2025 Barn Authors. This program is free software: you can
// redistribute it and/or modify it under the terms of the GNU General Public
// License as published by the Free Software Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use crate::tasks::command_parse::ParsedCommand;
use crate::vm::frame::VmFrame;
use barn_compiler::{ForkBody, GlobalName, Program};
use barn_var::{v_obj, v_str, v_string, Obj, Symbol, Var, NOTHING};
use bincode::{Decode, Encode};

/// One verb (or eval) invocation on the call stack.
#[derive(Clone, Debug, Encode, Decode)]
pub struct Activation {
    pub frame: VmFrame,
    /// The receiver; an object, or a waif when the verb was reached through one.
    pub this: Var,
    pub player: Obj,
    /// `this` of the calling activation; NOTHING at the top of a task.
    pub caller: Var,
    pub verb_name: Symbol,
    /// The object the running verb is defined on.
    pub definer: Obj,
    /// Whose permissions the frame runs under: the verb owner, until
    /// `set_task_perms` changes it.
    pub permissions: Obj,
    /// The verb's 'd' flag: raise errors rather than returning them as values.
    pub debug: bool,
    pub args: Var,
    pub command: Option<ParsedCommand>,
}

impl Activation {
    #[allow(clippy::too_many_arguments)]
    pub fn for_verb(
        program: Program,
        this: Var,
        player: Obj,
        caller: Var,
        verb_name: Symbol,
        definer: Obj,
        permissions: Obj,
        debug: bool,
        args: Var,
        command: Option<ParsedCommand>,
    ) -> Self {
        let mut a = Activation {
            frame: VmFrame::new(program),
            this,
            player,
            caller,
            verb_name,
            definer,
            permissions,
            debug,
            args,
            command,
        };
        a.bind_task_variables();
        a
    }

    /// An activation for an eval task: the code runs as a verb named `eval` on
    /// the programmer, with no command context.
    pub fn for_eval(program: Program, player: Obj, programmer: Obj) -> Self {
        Self::for_verb(
            program,
            v_obj(programmer),
            player,
            v_obj(NOTHING),
            Symbol::mk("eval"),
            programmer,
            programmer,
            true,
            barn_var::v_empty_list(),
            None,
        )
    }

    /// The child-side activation for a fork: same environment, program counter at
    /// the body start, fresh stacks, and handler visibility fenced to the body.
    pub fn for_fork(&self, fork: &ForkBody) -> Self {
        let mut child = self.clone();
        let start = fork.offset.0 as usize;
        child.frame.pc = start;
        child.frame.span = Some((start, start + fork.len as usize));
        child.frame.valstack.clear();
        child.frame.finally_stack.clear();
        child.frame.temp = None;
        child.command = None;
        child
    }

    /// Bind the reserved task variables into their fixed slots.
    fn bind_task_variables(&mut self) {
        let frame = &mut self.frame;
        frame.set_env(&GlobalName::This.slot(), self.this.clone());
        frame.set_env(&GlobalName::Player.slot(), v_obj(self.player));
        frame.set_env(&GlobalName::Caller.slot(), self.caller.clone());
        frame.set_env(
            &GlobalName::Verb.slot(),
            v_string(self.verb_name.to_string()),
        );
        frame.set_env(&GlobalName::Args.slot(), self.args.clone());
        match &self.command {
            Some(command) => {
                frame.set_env(&GlobalName::Argstr.slot(), v_str(&command.argstr));
                frame.set_env(&GlobalName::Dobjstr.slot(), v_str(&command.dobjstr));
                frame.set_env(&GlobalName::Dobj.slot(), v_obj(command.dobj));
                frame.set_env(&GlobalName::Prepstr.slot(), v_str(&command.prepstr));
                frame.set_env(&GlobalName::Iobjstr.slot(), v_str(&command.iobjstr));
                frame.set_env(&GlobalName::Iobj.slot(), v_obj(command.iobj));
            }
            None => {
                frame.set_env(&GlobalName::Argstr.slot(), v_str(""));
                frame.set_env(&GlobalName::Dobjstr.slot(), v_str(""));
                frame.set_env(&GlobalName::Dobj.slot(), v_obj(NOTHING));
                frame.set_env(&GlobalName::Prepstr.slot(), v_str(""));
                frame.set_env(&GlobalName::Iobjstr.slot(), v_str(""));
                frame.set_env(&GlobalName::Iobj.slot(), v_obj(NOTHING));
            }
        }
    }
}
